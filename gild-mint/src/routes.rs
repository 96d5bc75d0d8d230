//! Axum handlers for the v1 cashu API.

use axum::extract::{Path, State};
use axum::Json;
use gild_core::primitives::{
    KeyResponse, KeysResponse, KeysetsResponse, MintInfoResponse,
    PostCheckStateRequest, PostCheckStateResponse, PostMeltBolt11Request,
    PostMeltQuoteBolt11Request, PostMeltQuoteBolt11Response, PostMintBolt11Request,
    PostMintBolt11Response, PostMintQuoteBolt11Request, PostMintQuoteBolt11Response,
    PostRestoreRequest, PostRestoreResponse, PostSwapRequest, PostSwapResponse,
};
use tracing::instrument;

use crate::error::MintError;
use crate::info::mint_info;
use crate::mint::Mint;
use crate::model::unix_time_now;

#[utoipa::path(
        get,
        path = "/v1/info",
        responses(
            (status = 200, description = "mint metadata and supported nuts", body = [MintInfoResponse])
        ),
    )]
#[instrument(skip(mint), err)]
pub async fn get_info(State(mint): State<Mint>) -> Result<Json<MintInfoResponse>, MintError> {
    Ok(Json(mint_info(&mint.config)))
}

#[utoipa::path(
        get,
        path = "/v1/keys",
        responses(
            (status = 200, description = "public keys of all active keysets", body = [KeysResponse])
        ),
    )]
#[instrument(skip(mint), err)]
pub async fn get_keys(State(mint): State<Mint>) -> Result<Json<KeysResponse>, MintError> {
    let keysets = mint
        .get_keyset_infos()
        .await
        .into_iter()
        .filter(|info| info.active)
        .collect::<Vec<_>>();

    let mut responses = Vec::with_capacity(keysets.len());
    for info in keysets {
        let keyset = mint
            .get_keyset_by_id(&info.id)
            .await
            .ok_or_else(|| MintError::KeysetUnknown(info.id.clone()))?;
        responses.push(KeyResponse {
            id: keyset.keyset_id.clone(),
            unit: keyset.unit.clone(),
            keys: keyset.public_keys.clone(),
        });
    }
    Ok(Json(KeysResponse { keysets: responses }))
}

#[utoipa::path(
        get,
        path = "/v1/keys/{id}",
        responses(
            (status = 200, description = "public keys of one keyset, active or not", body = [KeysResponse])
        ),
        params(
            ("id" = String, Path, description = "keyset id"),
        )
    )]
#[instrument(skip(mint), err)]
pub async fn get_keys_by_id(
    Path(id): Path<String>,
    State(mint): State<Mint>,
) -> Result<Json<KeysResponse>, MintError> {
    let keyset = mint
        .get_keyset_by_id(&id)
        .await
        .ok_or(MintError::KeysetUnknown(id))?;

    Ok(Json(KeysResponse {
        keysets: vec![KeyResponse {
            id: keyset.keyset_id.clone(),
            unit: keyset.unit.clone(),
            keys: keyset.public_keys.clone(),
        }],
    }))
}

#[utoipa::path(
        get,
        path = "/v1/keysets",
        responses(
            (status = 200, description = "summaries of all keysets", body = [KeysetsResponse])
        ),
    )]
#[instrument(skip(mint), err)]
pub async fn get_keysets(State(mint): State<Mint>) -> Result<Json<KeysetsResponse>, MintError> {
    Ok(Json(KeysetsResponse {
        keysets: mint.get_keyset_infos().await,
    }))
}

#[utoipa::path(
        post,
        path = "/v1/swap",
        request_body = PostSwapRequest,
        responses(
            (status = 200, description = "post swap", body = [PostSwapResponse])
        ),
    )]
#[instrument(name = "post_swap", skip_all, err)]
pub async fn post_swap(
    State(mint): State<Mint>,
    Json(request): Json<PostSwapRequest>,
) -> Result<Json<PostSwapResponse>, MintError> {
    let signatures = mint.process_swap(&request).await?;
    Ok(Json(PostSwapResponse { signatures }))
}

#[utoipa::path(
        post,
        path = "/v1/mint/quote/bolt11",
        request_body = PostMintQuoteBolt11Request,
        responses(
            (status = 200, description = "post mint quote", body = [PostMintQuoteBolt11Response])
        ),
    )]
#[instrument(name = "post_mint_quote_bolt11", skip(mint), err)]
pub async fn post_mint_quote_bolt11(
    State(mint): State<Mint>,
    Json(request): Json<PostMintQuoteBolt11Request>,
) -> Result<Json<PostMintQuoteBolt11Response>, MintError> {
    Ok(Json(mint.create_mint_quote(&request).await?))
}

#[utoipa::path(
        get,
        path = "/v1/mint/quote/bolt11/{quote_id}",
        responses(
            (status = 200, description = "get mint quote by id", body = [PostMintQuoteBolt11Response])
        ),
        params(
            ("quote_id" = String, Path, description = "quote id"),
        )
    )]
#[instrument(name = "get_mint_quote_bolt11", skip(mint), err)]
pub async fn get_mint_quote_bolt11(
    Path(quote_id): Path<String>,
    State(mint): State<Mint>,
) -> Result<Json<PostMintQuoteBolt11Response>, MintError> {
    Ok(Json(mint.check_mint_quote(&quote_id).await?))
}

#[utoipa::path(
        post,
        path = "/v1/mint/bolt11",
        request_body = PostMintBolt11Request,
        responses(
            (status = 200, description = "mint tokens for a paid quote", body = [PostMintBolt11Response])
        ),
    )]
#[instrument(name = "post_mint_bolt11", fields(quote_id = %request.quote), skip_all, err)]
pub async fn post_mint_bolt11(
    State(mint): State<Mint>,
    Json(request): Json<PostMintBolt11Request>,
) -> Result<Json<PostMintBolt11Response>, MintError> {
    Ok(Json(mint.process_mint(&request).await?))
}

#[utoipa::path(
        post,
        path = "/v1/melt/quote/bolt11",
        request_body = PostMeltQuoteBolt11Request,
        responses(
            (status = 200, description = "post melt quote", body = [PostMeltQuoteBolt11Response])
        ),
    )]
#[instrument(name = "post_melt_quote_bolt11", skip_all, err)]
pub async fn post_melt_quote_bolt11(
    State(mint): State<Mint>,
    Json(request): Json<PostMeltQuoteBolt11Request>,
) -> Result<Json<PostMeltQuoteBolt11Response>, MintError> {
    Ok(Json(mint.create_melt_quote(&request).await?))
}

#[utoipa::path(
        get,
        path = "/v1/melt/quote/bolt11/{quote_id}",
        responses(
            (status = 200, description = "get melt quote by id", body = [PostMeltQuoteBolt11Response])
        ),
        params(
            ("quote_id" = String, Path, description = "quote id"),
        )
    )]
#[instrument(name = "get_melt_quote_bolt11", skip(mint), err)]
pub async fn get_melt_quote_bolt11(
    Path(quote_id): Path<String>,
    State(mint): State<Mint>,
) -> Result<Json<PostMeltQuoteBolt11Response>, MintError> {
    Ok(Json(mint.check_melt_quote(&quote_id).await?))
}

#[utoipa::path(
        post,
        path = "/v1/melt/bolt11",
        request_body = PostMeltBolt11Request,
        responses(
            (status = 200, description = "melt tokens into a Lightning payment", body = [PostMeltQuoteBolt11Response])
        ),
    )]
#[instrument(name = "post_melt_bolt11", fields(quote_id = %request.quote), skip_all, err)]
pub async fn post_melt_bolt11(
    State(mint): State<Mint>,
    Json(request): Json<PostMeltBolt11Request>,
) -> Result<Json<PostMeltQuoteBolt11Response>, MintError> {
    Ok(Json(mint.process_melt(&request).await?))
}

#[utoipa::path(
        post,
        path = "/v1/checkstate",
        request_body = PostCheckStateRequest,
        responses(
            (status = 200, description = "spend state per proof identifier", body = [PostCheckStateResponse])
        ),
    )]
#[instrument(name = "post_checkstate", skip_all, err)]
pub async fn post_checkstate(
    State(mint): State<Mint>,
    Json(request): Json<PostCheckStateRequest>,
) -> Result<Json<PostCheckStateResponse>, MintError> {
    let states = mint
        .db
        .proof_states(&request.ys, unix_time_now())
        .await?;
    Ok(Json(PostCheckStateResponse { states }))
}

#[utoipa::path(
        post,
        path = "/v1/restore",
        request_body = PostRestoreRequest,
        responses(
            (status = 200, description = "previously issued signatures by blinded message", body = [PostRestoreResponse])
        ),
    )]
#[instrument(name = "post_restore", skip_all, err)]
pub async fn post_restore(
    State(mint): State<Mint>,
    Json(request): Json<PostRestoreRequest>,
) -> Result<Json<PostRestoreResponse>, MintError> {
    let (outputs, signatures) = mint.restore_signatures(&request.outputs).await?;
    Ok(Json(PostRestoreResponse {
        outputs,
        signatures,
    }))
}
