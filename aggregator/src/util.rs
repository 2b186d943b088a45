use crate::*;
use std::future::Future;
use std::time::Duration;

/// Default time budget for one collaborator round trip
pub const DEFAULT_COLLABORATOR_TIMEOUT: Duration = Duration::from_secs(30);

/// Run a collaborator call, turning an expired deadline into a retryable error.
pub async fn bounded<T, F>(
    collaborator: &'static str,
    timeout: Duration,
    call: F,
) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(Error::unavailable(
            collaborator,
            format!("no answer within {:?}", timeout),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn times_out() {
        let res: Result<(), Error> = bounded("authority", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        match res {
            Err(e @ Error::CollaboratorUnavailable { .. }) => assert!(e.is_retryable()),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn passes_results_through() {
        let res = bounded("authority", Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(res.unwrap(), 7);

        let res: Result<(), Error> = bounded("authority", Duration::from_secs(1), async {
            Err(Error::DecryptionFailed("refused".into()))
        })
        .await;
        assert!(matches!(res, Err(Error::DecryptionFailed(_))));
    }
}
