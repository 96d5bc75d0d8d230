//! Router assembly and server startup.

use std::time::Duration;

use axum::routing::{get, post};
use axum::{Json, Router};
use gild_core::blind::{BlindedMessage, BlindedSignature};
use gild_core::keyset::KeysetInfo;
use gild_core::primitives::{
    ContactInfoResponse, CurrencyUnit, KeyResponse, KeysResponse, KeysetsResponse,
    MeltOptions, MeltQuoteState, MintInfoResponse, MintQuoteState, Mpp, MppMethodConfig,
    MppSettings, NutSupported, Nuts, PaymentMethod, PaymentMethodConfig,
    PaymentMethodSettings, PostCheckStateRequest, PostCheckStateResponse,
    PostMeltBolt11Request, PostMeltQuoteBolt11Request, PostMeltQuoteBolt11Response,
    PostMintBolt11Request, PostMintBolt11Response, PostMintQuoteBolt11Request,
    PostMintQuoteBolt11Response, PostRestoreRequest, PostRestoreResponse, PostSwapRequest,
    PostSwapResponse, ProofState, ProofStateEntry,
};
use gild_core::proof::{Proof, Proofs};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::prelude::__tracing_subscriber_SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;

use crate::mint::Mint;
use crate::routes::{
    get_info, get_keys, get_keys_by_id, get_keysets, get_melt_quote_bolt11,
    get_mint_quote_bolt11, post_checkstate, post_melt_bolt11, post_melt_quote_bolt11,
    post_mint_bolt11, post_mint_quote_bolt11, post_restore, post_swap,
};

pub async fn run_server(mint: Mint) -> anyhow::Result<()> {
    // MINT_LOG_FORMAT=json switches to structured log output
    let registry = tracing_subscriber::registry().with(EnvFilter::from_default_env());
    if std::env::var("MINT_LOG_FORMAT").as_deref() == Ok("json") {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    info!("listening on: {}", &mint.config.server.host_port);
    info!("mint-info: {:?}", mint.config.info);
    info!("lightning fee config: {:?}", mint.config.lightning_fee);
    info!(
        "mint limits: [{}, {}] sat",
        mint.config.limits.mint_min_sat, mint.config.limits.mint_max_sat
    );

    spawn_sweeper(mint.clone());

    let listener = tokio::net::TcpListener::bind(&mint.config.server.host_port).await?;
    axum::serve(
        listener,
        app(mint)
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_headers(Any)
                    .allow_methods(Any)
                    .expose_headers(Any),
            )
            .into_make_service(),
    )
    .await?;

    Ok(())
}

/// Deletes expired unpaid quotes and releases expired pending proofs on an
/// interval.
fn spawn_sweeper(mint: Mint) {
    let interval = Duration::from_secs(mint.config.quotes.sweep_interval_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(err) = mint.sweep_expired().await {
                tracing::warn!("sweeper run failed: {err:?}");
            }
        }
    });
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::get_info,
        crate::routes::get_keys,
        crate::routes::get_keys_by_id,
        crate::routes::get_keysets,
        crate::routes::post_swap,
        crate::routes::post_mint_quote_bolt11,
        crate::routes::get_mint_quote_bolt11,
        crate::routes::post_mint_bolt11,
        crate::routes::post_melt_quote_bolt11,
        crate::routes::get_melt_quote_bolt11,
        crate::routes::post_melt_bolt11,
        crate::routes::post_checkstate,
        crate::routes::post_restore,
        get_health,
    ),
    components(schemas(
        MintInfoResponse,
        ContactInfoResponse,
        Nuts,
        NutSupported,
        PaymentMethodSettings,
        PaymentMethodConfig,
        MppSettings,
        MppMethodConfig,
        MeltOptions,
        Mpp,
        MintQuoteState,
        MeltQuoteState,
        CurrencyUnit,
        PaymentMethod,
        KeysResponse,
        KeyResponse,
        KeysetsResponse,
        KeysetInfo,
        BlindedMessage,
        BlindedSignature,
        Proof,
        Proofs,
        ProofState,
        ProofStateEntry,
        PostSwapRequest,
        PostSwapResponse,
        PostMintQuoteBolt11Request,
        PostMintQuoteBolt11Response,
        PostMintBolt11Request,
        PostMintBolt11Response,
        PostMeltQuoteBolt11Request,
        PostMeltQuoteBolt11Response,
        PostMeltBolt11Request,
        PostCheckStateRequest,
        PostCheckStateResponse,
        PostRestoreRequest,
        PostRestoreResponse,
    ))
)]
pub struct ApiDoc;

pub fn app(mint: Mint) -> Router {
    Router::new()
        .route("/v1/info", get(get_info))
        .route("/v1/keys", get(get_keys))
        .route("/v1/keys/:id", get(get_keys_by_id))
        .route("/v1/keysets", get(get_keysets))
        .route("/v1/swap", post(post_swap))
        .route("/v1/mint/quote/bolt11", post(post_mint_quote_bolt11))
        .route("/v1/mint/quote/bolt11/:quote_id", get(get_mint_quote_bolt11))
        .route("/v1/mint/bolt11", post(post_mint_bolt11))
        .route("/v1/melt/quote/bolt11", post(post_melt_quote_bolt11))
        .route("/v1/melt/quote/bolt11/:quote_id", get(get_melt_quote_bolt11))
        .route("/v1/melt/bolt11", post(post_melt_bolt11))
        .route("/v1/checkstate", post(post_checkstate))
        .route("/v1/restore", post(post_restore))
        .route("/health", get(get_health))
        .layer(TraceLayer::new_for_http())
        .with_state(mint)
}

#[utoipa::path(
        get,
        path = "/health",
        responses(
            (status = 200, description = "health check")
        ),
    )]
async fn get_health(
    axum::extract::State(mint): axum::extract::State<Mint>,
) -> impl axum::response::IntoResponse {
    let lightning_ready = mint.lightning.is_ready().await.unwrap_or(false);
    Json(serde_json::json!({ "status": "ok", "lightning_ready": lightning_ready }))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use gild_core::primitives::{KeysResponse, MintInfoResponse};
    use http_body_util::BodyExt;
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    use super::app;
    use crate::mint::tests::test_mint;

    #[tokio::test]
    async fn test_get_info_route() -> anyhow::Result<()> {
        let mint = test_mint().await?;
        let response = app(mint)
            .oneshot(Request::builder().uri("/v1/info").body(Body::empty())?)
            .await?;

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await?.to_bytes();
        let info: MintInfoResponse = serde_json::from_slice(&body)?;
        assert!(info.nuts.nut7.supported);
        Ok(())
    }

    #[tokio::test]
    async fn test_get_keys_route() -> anyhow::Result<()> {
        let mint = test_mint().await?;
        let response = app(mint)
            .oneshot(Request::builder().uri("/v1/keys").body(Body::empty())?)
            .await?;

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await?.to_bytes();
        let keys: KeysResponse = serde_json::from_slice(&body)?;
        assert_eq!(keys.keysets.len(), 1);
        assert_eq!(keys.keysets[0].keys.len(), 21);
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_keyset_is_client_error() -> anyhow::Result<()> {
        let mint = test_mint().await?;
        let response = app(mint)
            .oneshot(
                Request::builder()
                    .uri("/v1/keys/00ffffffffffffff")
                    .body(Body::empty())?,
            )
            .await?;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = response.into_body().collect().await?.to_bytes();
        let error: serde_json::Value = serde_json::from_slice(&body)?;
        assert_eq!(error["code"], 12001);
        Ok(())
    }

    #[tokio::test]
    async fn test_swap_route_double_spend_error_body() -> anyhow::Result<()> {
        use crate::mint::tests::{blinded_outputs, make_proofs};

        let mint = test_mint().await?;
        let inputs = make_proofs(&mint, &[4, 8]).await?;
        let keyset_id = inputs.proofs()[0].keyset_id.clone();

        let request_body = serde_json::json!({
            "inputs": &inputs,
            "outputs": blinded_outputs(&keyset_id, &[4, 8]),
        });

        let request = |body: String| {
            Request::builder()
                .method("POST")
                .uri("/v1/swap")
                .header("content-type", "application/json")
                .body(Body::from(body))
        };

        let response = app(mint.clone())
            .oneshot(request(request_body.to_string())?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);

        // replaying the same swap yields the Nut-00 double spend error body
        let replay_body = serde_json::json!({
            "inputs": &inputs,
            "outputs": blinded_outputs(&keyset_id, &[4, 8]),
        });
        let response = app(mint)
            .oneshot(request(replay_body.to_string())?)
            .await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = response.into_body().collect().await?.to_bytes();
        let error: serde_json::Value = serde_json::from_slice(&body)?;
        assert_eq!(error["code"], 11001);
        assert!(error["detail"].is_string());
        Ok(())
    }
}
