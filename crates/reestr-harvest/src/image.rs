//! Direct image download for records whose detail page exposed an image
//! URL. The registry checks the referer, so requests carry the registry
//! front page as referer.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::error::HarvestError;

/// Downloads `image_url` and returns its bytes base64-encoded.
///
/// # Errors
///
/// Returns [`HarvestError::HttpStatus`] for non-2xx responses and
/// [`HarvestError::Http`] for transport failures.
pub async fn download_image_base64(
    client: &reqwest::Client,
    image_url: &str,
    referer: &str,
) -> Result<String, HarvestError> {
    let response = client
        .get(image_url)
        .header(reqwest::header::REFERER, referer)
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        return Err(HarvestError::HttpStatus {
            status: status.as_u16(),
            url: image_url.to_owned(),
        });
    }
    let bytes = response.bytes().await?;
    Ok(BASE64.encode(&bytes))
}
