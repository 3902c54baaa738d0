//! Bidirectional byte relay between the local connection and the tunneled stream.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// Copies bytes both ways between `local` and `remote` until either side closes.
///
/// Each direction runs in its own task. When the first direction finishes the
/// other one is aborted. Returns the number of bytes copied by the direction
/// that finished first.
pub async fn relay<L, R>(local: L, remote: R) -> std::io::Result<u64>
where
    L: AsyncRead + AsyncWrite + Send + 'static,
    R: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut local_read, mut local_write) = tokio::io::split(local);
    let (mut remote_read, mut remote_write) = tokio::io::split(remote);

    let mut upstream = tokio::spawn(async move {
        let n = tokio::io::copy(&mut local_read, &mut remote_write).await?;
        let _ = remote_write.shutdown().await;
        Ok::<u64, std::io::Error>(n)
    });
    let mut downstream = tokio::spawn(async move {
        let n = tokio::io::copy(&mut remote_read, &mut local_write).await?;
        let _ = local_write.shutdown().await;
        Ok::<u64, std::io::Error>(n)
    });

    let finished = tokio::select! {
        r = &mut upstream => {
            downstream.abort();
            r
        }
        r = &mut downstream => {
            upstream.abort();
            r
        }
    };

    match finished {
        Ok(result) => result,
        Err(join) => Err(std::io::Error::new(std::io::ErrorKind::Other, join)),
    }
}
