//! Typed procedures served under `/api/rpc/{procedure}`.
//!
//! Queries are called with `GET` and an optional `?input=<json>`, mutations
//! with `POST` and a JSON body. Every response uses the envelope
//! `{ "result": { "data": … } }` or `{ "error": { "code", "message" } }`.

use std::str::FromStr;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use core_types::Session;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::ApiError;
use crate::session::MaybeSession;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Procedure {
    Hello,
    GetLatest,
    Create,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Query,
    Mutation,
}

impl FromStr for Procedure {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "post.hello" => Ok(Self::Hello),
            "post.getLatest" => Ok(Self::GetLatest),
            "post.create" => Ok(Self::Create),
            _ => Err(()),
        }
    }
}

impl Procedure {
    fn kind(self) -> Kind {
        match self {
            Self::Hello | Self::GetLatest => Kind::Query,
            Self::Create => Kind::Mutation,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RpcQuery {
    input: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HelloInput {
    text: String,
}

#[derive(Debug, Deserialize)]
struct CreatePostInput {
    name: String,
}

enum RpcError {
    Api(ApiError),
    UnknownProcedure(String),
    WrongMethod(&'static str),
}

impl From<ApiError> for RpcError {
    fn from(value: ApiError) -> Self {
        Self::Api(value)
    }
}

impl From<anyhow::Error> for RpcError {
    fn from(value: anyhow::Error) -> Self {
        Self::Api(ApiError::Internal(value))
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            Self::UnknownProcedure(name) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("No procedure found on path \"{name}\""),
            ),
            Self::WrongMethod(expected) => (
                StatusCode::METHOD_NOT_ALLOWED,
                "METHOD_NOT_SUPPORTED",
                format!("This procedure must be called with {expected}"),
            ),
            Self::Api(err) => {
                let code = match &err {
                    ApiError::BadRequest(_) | ApiError::NotConfigured(_) => "BAD_REQUEST",
                    ApiError::Unauthorized(_) => "UNAUTHORIZED",
                    ApiError::ConsentRequired => "FORBIDDEN",
                    ApiError::NotFound(_) => "NOT_FOUND",
                    ApiError::Conflict(_) => "CONFLICT",
                    ApiError::Internal(_) => "INTERNAL_SERVER_ERROR",
                };
                (err.status(), code, err.public_message())
            }
        };
        (
            status,
            Json(json!({ "error": { "code": code, "message": message } })),
        )
            .into_response()
    }
}

/// GET /api/rpc/{procedure}
pub async fn query(
    State(state): State<AppState>,
    Path(procedure): Path<String>,
    Query(params): Query<RpcQuery>,
    MaybeSession(session): MaybeSession,
) -> Response {
    let input = match params.input.as_deref().map(serde_json::from_str::<Value>) {
        None => Ok(Value::Null),
        Some(Ok(value)) => Ok(value),
        Some(Err(err)) => Err(ApiError::BadRequest(format!("input is not valid json: {err}"))),
    };
    respond(async {
        let procedure = resolve(&procedure, Kind::Query)?;
        dispatch(&state, procedure, session, input?).await
    })
    .await
}

/// POST /api/rpc/{procedure}
pub async fn mutation(
    State(state): State<AppState>,
    Path(procedure): Path<String>,
    MaybeSession(session): MaybeSession,
    body: Bytes,
) -> Response {
    let input = if body.is_empty() {
        Ok(Value::Null)
    } else {
        serde_json::from_slice::<Value>(&body)
            .map_err(|err| ApiError::BadRequest(format!("body is not valid json: {err}")))
    };
    respond(async {
        let procedure = resolve(&procedure, Kind::Mutation)?;
        dispatch(&state, procedure, session, input?).await
    })
    .await
}

async fn respond(call: impl Future<Output = Result<Value, RpcError>>) -> Response {
    match call.await {
        Ok(data) => Json(json!({ "result": { "data": data } })).into_response(),
        Err(err) => err.into_response(),
    }
}

fn resolve(name: &str, called_as: Kind) -> Result<Procedure, RpcError> {
    let procedure =
        Procedure::from_str(name).map_err(|_| RpcError::UnknownProcedure(name.to_string()))?;
    match (procedure.kind(), called_as) {
        (Kind::Query, Kind::Mutation) => Err(RpcError::WrongMethod("GET")),
        (Kind::Mutation, Kind::Query) => Err(RpcError::WrongMethod("POST")),
        _ => Ok(procedure),
    }
}

async fn dispatch(
    state: &AppState,
    procedure: Procedure,
    session: Option<Session>,
    input: Value,
) -> Result<Value, RpcError> {
    debug!(?procedure, "rpc call");
    match procedure {
        Procedure::Hello => {
            let input: HelloInput = parse_input(input)?;
            Ok(json!({ "greeting": format!("Hello {}", input.text) }))
        }
        Procedure::GetLatest => {
            let session = session.ok_or_else(ApiError::unauthorized)?;
            let storage = state.require_storage()?;
            let post = storage.latest_post_for(session.user.id).await?;
            Ok(json!(post))
        }
        Procedure::Create => {
            let session = session.ok_or_else(ApiError::unauthorized)?;
            let input: CreatePostInput = parse_input(input)?;
            let name = input.name.trim();
            if name.is_empty() {
                return Err(ApiError::BadRequest("name must not be empty".into()).into());
            }
            let storage = state.require_storage()?;
            let post = storage.create_post(name, session.user.id).await?;
            Ok(json!(post))
        }
    }
}

fn parse_input<T: DeserializeOwned>(input: Value) -> Result<T, ApiError> {
    serde_json::from_value(input)
        .map_err(|err| ApiError::BadRequest(format!("invalid input: {err}")))
}
