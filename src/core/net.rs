use crate::core::models::ApiResponse;
use crate::core::transport::TransportError;

/// Buffers a reqwest response into an [`ApiResponse`].
///
/// Body read failures count as transport errors: the status line arrived but the response
/// is unusable.
pub(crate) async fn read_response(resp: reqwest::Response) -> Result<ApiResponse, TransportError> {
    let status = resp.status();
    let headers = resp.headers().clone();
    let url = resp.url().clone();
    let body = resp.bytes().await?;

    #[cfg(feature = "tracing")]
    tracing::trace!(%status, path = url.path(), len = body.len(), "response received");

    Ok(ApiResponse::new(status, headers, body.to_vec(), url))
}
