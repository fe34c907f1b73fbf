//! actix-web 0.7 handlers for the meta-controller HTTP contract: a
//! ping/sync/finalize/customize quadruple per kind, in the pre-async
//! "App/HttpServer with `.resource().method().with(handler)`" style.

use crate::reconciler;
use actix_web::{HttpRequest, HttpResponse, Json};
use hpcr_definitions::ResourceStatus;
use serde_json::Value;

#[derive(Clone)]
pub struct BuildInfo {
    pub version: String,
    pub compile_time: String,
}

#[derive(Serialize)]
struct PingResponse<'a> {
    version: &'a str,
    compile: &'a str,
}

#[derive(Serialize)]
struct ResourceStatusResponse {
    status: ResourceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "resyncAfterSeconds")]
    resync_after_seconds: Option<u64>,
}

impl From<ResourceStatus> for ResourceStatusResponse {
    fn from(status: ResourceStatus) -> Self {
        let resync_after_seconds = status.resync_after_seconds();
        ResourceStatusResponse { status, resync_after_seconds }
    }
}

#[derive(Serialize)]
struct FinalizeResponse {
    finalized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "resyncAfterSeconds")]
    resync_after_seconds: Option<u64>,
}

#[derive(Serialize)]
struct CustomizeResponse {
    #[serde(rename = "relatedResourceRules")]
    related_resource_rules: Vec<hpcr_definitions::RelatedResourceRule>,
}

pub fn ping(req: &HttpRequest<BuildInfo>) -> HttpResponse {
    let info = req.state();
    HttpResponse::Ok().json(PingResponse {
        version: &info.version,
        compile: &info.compile_time,
    })
}

/// Every customize handler decodes into a generic `Value` then calls the
/// appropriate reconciler function; malformed JSON is the one case the
/// contract (§6) allows a non-200 response for.
fn sync_onprem((body, req): (Json<Value>, HttpRequest<BuildInfo>)) -> HttpResponse {
    let self_exe = self_exe_path(&req);
    let status = reconciler::sync_onprem(&self_exe, &body);
    HttpResponse::Ok().json(ResourceStatusResponse::from(status))
}

fn finalize_onprem(body: Json<Value>) -> HttpResponse {
    let status = reconciler::finalize_onprem(&body);
    finalize_response(status)
}

fn customize_onprem(body: Json<Value>) -> HttpResponse {
    customize_response(reconciler::customize_onprem(&body))
}

fn sync_datadisk(body: Json<Value>) -> HttpResponse {
    let status = reconciler::sync_datadisk(&body);
    HttpResponse::Ok().json(ResourceStatusResponse::from(status))
}

fn finalize_datadisk(body: Json<Value>) -> HttpResponse {
    let status = reconciler::finalize_datadisk(&body);
    finalize_response(status)
}

fn customize_datadisk(body: Json<Value>) -> HttpResponse {
    customize_response(reconciler::customize_datadisk(&body))
}

fn sync_vpc(body: Json<Value>) -> HttpResponse {
    let status = reconciler::sync_vpc(&body);
    HttpResponse::Ok().json(ResourceStatusResponse::from(status))
}

fn finalize_vpc(body: Json<Value>) -> HttpResponse {
    let status = reconciler::finalize_vpc(&body);
    finalize_response(status)
}

fn customize_vpc(body: Json<Value>) -> HttpResponse {
    customize_response(reconciler::customize_vpc(&body))
}

fn finalize_response(status: ResourceStatus) -> HttpResponse {
    let resync_after_seconds = status.resync_after_seconds();
    let finalized = status.status == hpcr_definitions::Status::Ready;
    HttpResponse::Ok().json(FinalizeResponse { finalized, resync_after_seconds })
}

fn customize_response(rules: crate::Result<Vec<hpcr_definitions::RelatedResourceRule>>) -> HttpResponse {
    match rules {
        Ok(related_resource_rules) => HttpResponse::Ok().json(CustomizeResponse { related_resource_rules }),
        Err(e) => {
            error!("customize failed: {}", e);
            HttpResponse::Ok().json(CustomizeResponse { related_resource_rules: Vec::new() })
        }
    }
}

fn self_exe_path(_req: &HttpRequest<BuildInfo>) -> String {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.to_str().map(str::to_string))
        .unwrap_or_else(|| "hpcr_cli".to_string())
}

pub fn configure(app: actix_web::App<BuildInfo>) -> actix_web::App<BuildInfo> {
    app.resource("/onprem/ping", |r| r.method(actix_web::http::Method::GET).f(ping))
        .resource("/onprem/sync", |r| r.method(actix_web::http::Method::POST).with(sync_onprem))
        .resource("/onprem/finalize", |r| r.method(actix_web::http::Method::POST).with(finalize_onprem))
        .resource("/onprem/customize", |r| r.method(actix_web::http::Method::POST).with(customize_onprem))
        .resource("/datadisk/ping", |r| r.method(actix_web::http::Method::GET).f(ping))
        .resource("/datadisk/sync", |r| r.method(actix_web::http::Method::POST).with(sync_datadisk))
        .resource("/datadisk/finalize", |r| r.method(actix_web::http::Method::POST).with(finalize_datadisk))
        .resource("/datadisk/customize", |r| r.method(actix_web::http::Method::POST).with(customize_datadisk))
        .resource("/vpc/ping", |r| r.method(actix_web::http::Method::GET).f(ping))
        .resource("/vpc/sync", |r| r.method(actix_web::http::Method::POST).with(sync_vpc))
        .resource("/vpc/finalize", |r| r.method(actix_web::http::Method::POST).with(finalize_vpc))
        .resource("/vpc/customize", |r| r.method(actix_web::http::Method::POST).with(customize_vpc))
}
