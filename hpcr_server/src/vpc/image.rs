//! Stock/named image selection, grounded on `vpc/image.go`'s
//! `FindStockImages`/`FindLatestStockImage`/`Findimage`.

use crate::vpc::{service::VpcService, VpcErrKind};
use regex::Regex;
use semver::Version;
use serde_json::Value;

const API_VERSION: &str = "2023-01-01";
const API_GENERATION: &str = "2";

pub struct StockImage {
    pub id: String,
    pub version: Version,
}

/// `^ibm-hyper-protect-container-runtime-(\d+)-(\d+)-s390x-(\d+)$`
fn stock_image_name_re() -> Regex {
    Regex::new(r"^ibm-hyper-protect-container-runtime-(\d+)-(\d+)-s390x-(\d+)$").expect("valid regex")
}

/// Lists public, available images, keeping only those matching the HPCR
/// naming convention, sorted by semver descending.
pub fn find_stock_images(service: &VpcService) -> crate::Result<Vec<StockImage>> {
    let url = format!(
        "{}/v1/images?visibility=public&version={}&generation={}",
        service.api_endpoint, API_VERSION, API_GENERATION
    );
    let mut response = service
        .client
        .get(&url)
        .header(reqwest::header::AUTHORIZATION, service.bearer())
        .send()
        .map_err(|e| VpcErrKind::ApiCallFailed("ListImages".into(), 0, e.to_string()))?;

    if !response.status().is_success() {
        return Err(VpcErrKind::ApiCallFailed("ListImages".into(), response.status().as_u16(), String::new()).into());
    }

    let body: Value = response
        .json()
        .map_err(|e| VpcErrKind::ApiCallFailed("ListImages".into(), 0, e.to_string()))?;

    let re = stock_image_name_re();
    let mut images: Vec<StockImage> = body["images"]
        .as_array()
        .into_iter()
        .flatten()
        .filter(|img| img["status"].as_str() == Some("available"))
        .filter_map(|img| {
            let name = img["name"].as_str()?;
            let caps = re.captures(name)?;
            let version = Version::parse(&format!("{}.{}.{}", &caps[1], &caps[2], &caps[3])).ok()?;
            Some(StockImage {
                id: img["id"].as_str()?.to_string(),
                version,
            })
        })
        .collect();

    images.sort_by(|a, b| b.version.cmp(&a.version));
    Ok(images)
}

pub fn find_latest_stock_image(service: &VpcService) -> crate::Result<String> {
    find_stock_images(service)?
        .into_iter()
        .next()
        .map(|image| image.id)
        .ok_or_else(|| VpcErrKind::StockImageNotFound.into())
}

pub fn find_image_by_name(service: &VpcService, name: &str) -> crate::Result<String> {
    let url = format!(
        "{}/v1/images?name={}&version={}&generation={}",
        service.api_endpoint, name, API_VERSION, API_GENERATION
    );
    let mut response = service
        .client
        .get(&url)
        .header(reqwest::header::AUTHORIZATION, service.bearer())
        .send()
        .map_err(|e| VpcErrKind::ApiCallFailed("ListImages".into(), 0, e.to_string()))?;

    if !response.status().is_success() {
        return Err(VpcErrKind::ApiCallFailed("ListImages".into(), response.status().as_u16(), name.to_string()).into());
    }

    let body: Value = response
        .json()
        .map_err(|e| VpcErrKind::ApiCallFailed("ListImages".into(), 0, e.to_string()))?;

    body["images"]
        .as_array()
        .and_then(|items| items.first())
        .and_then(|img| img["id"].as_str())
        .map(str::to_string)
        .ok_or_else(|| VpcErrKind::ImageNotFound(name.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vpc::service::VpcService;

    #[test]
    fn find_stock_images_filters_and_sorts_by_version() {
        let _mock = mockito::mock("GET", mockito::Matcher::Regex(r"^/v1/images".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"images": [
                    {"id": "old", "name": "ibm-hyper-protect-container-runtime-1-2-s390x-3", "status": "available"},
                    {"id": "new", "name": "ibm-hyper-protect-container-runtime-1-3-s390x-0", "status": "available"},
                    {"id": "unavailable", "name": "ibm-hyper-protect-container-runtime-9-9-s390x-9", "status": "deleting"},
                    {"id": "other-arch", "name": "ibm-hyper-protect-container-runtime-1-9-amd64-0", "status": "available"}
                ]}"#,
            )
            .create();

        let service = VpcService::for_testing(mockito::server_url(), "test-token".to_string());
        let images = find_stock_images(&service).unwrap();

        assert_eq!(images.len(), 2);
        assert_eq!(images[0].id, "new");
        assert_eq!(images[1].id, "old");
    }

    #[test]
    fn stock_image_regex_extracts_version_components() {
        let caps = stock_image_name_re()
            .captures("ibm-hyper-protect-container-runtime-1-2-s390x-3")
            .unwrap();
        assert_eq!(&caps[1], "1");
        assert_eq!(&caps[2], "2");
        assert_eq!(&caps[3], "3");
    }

    #[test]
    fn stock_image_regex_rejects_other_architectures() {
        assert!(stock_image_name_re()
            .captures("ibm-hyper-protect-container-runtime-1-2-amd64-3")
            .is_none());
    }
}
