use anyhow::Context;
use bytes::Bytes;
use tracing::warn;
use uuid::Uuid;

use super::normalize::NormalizedImage;
use crate::state::AppState;

const PRESIGN_TTL_SECS: u64 = 10 * 60;

pub async fn store_meal_photo(
    st: &AppState,
    user_id: Uuid,
    image: &NormalizedImage,
) -> anyhow::Result<String> {
    let ext = ext_from_mime(&image.mime_type).unwrap_or("bin");
    let key = format!("meals/{}/{}.{}", user_id, Uuid::new_v4(), ext);
    let body = Bytes::from(image.bytes().context("normalized image base64")?);
    st.storage
        .put_object(&key, body, &image.mime_type)
        .await
        .with_context(|| format!("put_object {}", key))?;
    Ok(key)
}

/// Resolves an image reference for the client. Inline `data:` URLs pass
/// through; object keys are presigned. Presign failures hide the image.
pub async fn resolve_image_ref(st: &AppState, image_ref: Option<&str>) -> Option<String> {
    let r = image_ref.filter(|r| !r.is_empty())?;
    if r.starts_with("data:") || r.starts_with("http://") || r.starts_with("https://") {
        return Some(r.to_string());
    }
    match st.storage.presign_get(r, PRESIGN_TTL_SECS).await {
        Ok(url) => Some(url),
        Err(e) => {
            warn!(error = %e, key = r, "presign failed");
            None
        }
    }
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::normalize::normalize;
    use image::{DynamicImage, ImageFormat, RgbImage};
    use std::io::Cursor;

    #[test]
    fn ext_from_mime_known_and_unknown() {
        assert_eq!(ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/png"), Some("png"));
        assert_eq!(ext_from_mime("application/octet-stream"), None);
    }

    #[tokio::test]
    async fn store_meal_photo_uses_user_scoped_jpg_key() {
        let state = AppState::fake();
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::new(8, 8))
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        let img = normalize(buf.get_ref()).unwrap();
        let user = Uuid::new_v4();

        let key = store_meal_photo(&state, user, &img).await.unwrap();
        assert!(key.starts_with(&format!("meals/{}/", user)));
        assert!(key.ends_with(".jpg"));
    }

    #[tokio::test]
    async fn resolve_image_ref_passes_inline_and_presigns_keys() {
        let state = AppState::fake();
        assert_eq!(resolve_image_ref(&state, None).await, None);
        assert_eq!(resolve_image_ref(&state, Some("")).await, None);
        assert_eq!(
            resolve_image_ref(&state, Some("data:image/png;base64,AA")).await.as_deref(),
            Some("data:image/png;base64,AA")
        );
        let url = resolve_image_ref(&state, Some("meals/u/x.jpg")).await.unwrap();
        assert_eq!(url, "https://fake.local/meals/u/x.jpg");
    }
}
