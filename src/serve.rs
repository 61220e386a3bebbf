use crate::error::PredictError;
use crate::features::trip_features::is_json_content_type;
use crate::model::model_manager::ModelManager;
use actix_web::http::header::ContentType;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpMessage, HttpRequest, HttpResponse, HttpServer, Responder};
use log::info;
use serde::Serialize;

const INDEX_HTML: &str = include_str!("../static/index.html");
const SCRIPT_JS: &str = include_str!("../static/script.js");

#[derive(Serialize)]
struct PredictionResponse {
    prediction: f64,
}

#[derive(Serialize)]
struct HealthcheckResponse {
    ok: bool,
    model_loaded: bool,
}

async fn home() -> impl Responder {
    HttpResponse::Ok()
        .content_type(ContentType::html())
        .body(INDEX_HTML)
}

async fn script() -> impl Responder {
    HttpResponse::Ok()
        .content_type("application/javascript; charset=utf-8")
        .body(SCRIPT_JS)
}

async fn healthcheck(manager: web::Data<ModelManager>) -> impl Responder {
    let response = HealthcheckResponse {
        ok: true,
        model_loaded: manager.is_loaded(),
    };
    HttpResponse::Ok().json(response)
}

// raw bytes rather than web::Json: missing or non-JSON bodies must reach
// the decoder as an empty object instead of being rejected by the extractor
async fn predict(
    req: HttpRequest,
    manager: web::Data<ModelManager>,
    body: web::Bytes,
) -> Result<HttpResponse, PredictError> {
    let payload: &[u8] = if is_json_content_type(req.content_type()) {
        &body
    } else {
        &[]
    };
    let prediction = manager.predict_body(payload).await?;
    Ok(HttpResponse::Ok().json(PredictionResponse { prediction }))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(home))
        .route("/static/script.js", web::get().to(script))
        .route("/health", web::get().to(healthcheck))
        .route("/predict", web::post().to(predict));
}

pub async fn run_server(host: String, port: u16, manager: ModelManager) -> std::io::Result<()> {
    info!(
        "Listening on http://{host}:{port} (model loaded: {})",
        manager.is_loaded()
    );
    let shared_manager = web::Data::new(manager);
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(shared_manager.clone())
            .configure(configure)
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}
