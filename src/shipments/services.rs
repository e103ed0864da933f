use anyhow::Context;
use lazy_static::lazy_static;
use regex::Regex;
use uuid::Uuid;

use crate::shipments::repo_types::NewShipment;
use crate::state::AppState;

const IMAGE_URL_TTL_SECS: u64 = 30 * 60;
const MAX_IMAGES: usize = 8;

pub(crate) fn is_valid_phone(phone: &str) -> bool {
    lazy_static! {
        static ref PHONE_RE: Regex = Regex::new(r"^\+?[0-9][0-9 \-]{6,18}[0-9]$").unwrap();
    }
    PHONE_RE.is_match(phone.trim())
}

pub(crate) fn validate_new_shipment(new: &NewShipment) -> Result<(), String> {
    let required = [
        ("pickup_country", &new.pickup_country),
        ("dest_country", &new.dest_country),
        ("address", &new.address),
        ("receiver_name", &new.receiver_name),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(format!("{field} is required"));
        }
    }
    if !is_valid_phone(&new.receiver_phone) {
        return Err("receiver_phone is not a valid phone number".into());
    }
    if !(new.weight.is_finite() && new.weight > 0.0) {
        return Err("weight must be positive".into());
    }
    if !(new.fee.is_finite() && new.fee >= 0.0) {
        return Err("fee must not be negative".into());
    }
    if let (Some(from), Some(until)) = (new.available_from, new.available_until) {
        if from > until {
            return Err("available_from is after available_until".into());
        }
    }
    if new.images.len() > MAX_IMAGES {
        return Err(format!("at most {MAX_IMAGES} images"));
    }
    let owned_prefix = format!("shipments/{}/", new.sender_id);
    if let Some(key) = new.images.iter().find(|k| !k.starts_with(&owned_prefix)) {
        return Err(format!("image {key} was not uploaded by the sender"));
    }
    Ok(())
}

pub(crate) fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

/// Object key and presigned PUT url for one shipment image upload.
pub async fn image_upload_slot(
    st: &AppState,
    user_id: Uuid,
    content_type: &str,
) -> anyhow::Result<(String, String)> {
    let ext = ext_from_mime(content_type).context("unsupported image type")?;
    let key = format!("shipments/{}/{}.{}", user_id, Uuid::new_v4(), ext);
    let url = st
        .storage
        .presign_put(&key, content_type, IMAGE_URL_TTL_SECS)
        .await
        .with_context(|| format!("presign upload {}", key))?;
    Ok((key, url))
}

pub async fn presign_images(st: &AppState, keys: &[String]) -> anyhow::Result<Vec<String>> {
    let mut out = Vec::with_capacity(keys.len());
    for k in keys {
        out.push(
            st.storage
                .presign_get(k, IMAGE_URL_TTL_SECS)
                .await
                .with_context(|| format!("presign url for {}", k))?,
        );
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(sender_id: Uuid) -> NewShipment {
        NewShipment {
            sender_id,
            category: Some("Documents".into()),
            description: None,
            pickup_country: "Ethiopia".into(),
            dest_country: "Kenya".into(),
            address: "Bole Road 12".into(),
            receiver_name: "Abebe".into(),
            receiver_phone: "+251 911 234567".into(),
            weight: 1.5,
            fee: 40.0,
            notes: None,
            available_from: None,
            available_until: None,
            images: vec![format!("shipments/{sender_id}/a.jpg")],
        }
    }

    #[test]
    fn accepts_a_complete_posting() {
        assert_eq!(validate_new_shipment(&sample(Uuid::new_v4())), Ok(()));
    }

    #[test]
    fn rejects_bad_measurements() {
        let mut s = sample(Uuid::new_v4());
        s.weight = 0.0;
        assert!(validate_new_shipment(&s).unwrap_err().contains("weight"));
        let mut s = sample(Uuid::new_v4());
        s.fee = -1.0;
        assert!(validate_new_shipment(&s).unwrap_err().contains("fee"));
        let mut s = sample(Uuid::new_v4());
        s.weight = f64::NAN;
        assert!(validate_new_shipment(&s).is_err());
    }

    #[test]
    fn rejects_blank_route_and_bad_phone() {
        let mut s = sample(Uuid::new_v4());
        s.dest_country = "  ".into();
        assert_eq!(validate_new_shipment(&s).unwrap_err(), "dest_country is required");
        let mut s = sample(Uuid::new_v4());
        s.receiver_phone = "call me".into();
        assert!(validate_new_shipment(&s).unwrap_err().contains("receiver_phone"));
    }

    #[test]
    fn rejects_inverted_pickup_window() {
        let now = time::OffsetDateTime::now_utc();
        let mut s = sample(Uuid::new_v4());
        s.available_from = Some(now + time::Duration::days(2));
        s.available_until = Some(now);
        assert!(validate_new_shipment(&s).is_err());
    }

    #[test]
    fn rejects_images_of_other_users() {
        let mut s = sample(Uuid::new_v4());
        s.images = vec![format!("shipments/{}/x.png", Uuid::new_v4())];
        assert!(validate_new_shipment(&s).unwrap_err().contains("not uploaded"));
    }

    #[test]
    fn phone_formats() {
        assert!(is_valid_phone("0911234567"));
        assert!(is_valid_phone("+251911234567"));
        assert!(is_valid_phone("+1 415-555-0100"));
        assert!(!is_valid_phone("12"));
        assert!(!is_valid_phone("phone"));
    }

    #[test]
    fn test_ext_from_mime() {
        assert_eq!(ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/jpg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/png"), Some("png"));
        assert_eq!(ext_from_mime("image/webp"), Some("webp"));
        assert_eq!(ext_from_mime("image/heic"), Some("heic"));
        assert_eq!(ext_from_mime("application/octet-stream"), None);
    }

    #[tokio::test]
    async fn upload_slots_and_download_urls() {
        let state = AppState::fake();
        let user = Uuid::new_v4();
        let (key, url) = image_upload_slot(&state, user, "image/png").await.unwrap();
        assert!(key.starts_with(&format!("shipments/{user}/")));
        assert!(key.ends_with(".png"));
        assert!(url.contains(&key));

        assert!(image_upload_slot(&state, user, "text/plain").await.is_err());

        let urls = presign_images(&state, &[key.clone()]).await.unwrap();
        assert_eq!(urls.len(), 1);
        assert!(urls[0].contains(&key));
    }
}
