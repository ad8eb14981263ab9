// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Client seam over the authoritative run service.
//!
//! `RemoteRunApi` is what the sync layer needs from the server; the HTTP
//! implementation talks to the REST surface in `routes::run`. Tests inject
//! an in-memory implementation with failure injection.

use crate::error::AppError;
use crate::models::{PathPoint, Run, RunMetaPatch};
use crate::routes::run::{
    CreateRunRequest, CreateRunResponse, DeleteRunResponse, PointsResponse, RunUpdateRequest,
    RunUpdateResponse, RunsResponse,
};

/// Operations the sync layer performs against the authoritative service.
///
/// Implementations map transport failures to `AppError::Disconnected` so
/// the engine can distinguish "retry later" from real faults. All calls are
/// scoped to one user; the HTTP implementation derives the user from its
/// bearer token, so `user_id` must match the authenticated identity.
#[allow(async_fn_in_trait)]
pub trait RemoteRunApi: Send + Sync {
    /// Create a run if absent (idempotent, keyed by the client-assigned id).
    async fn create_run(&self, run: &Run) -> Result<(), AppError>;

    /// Replace a run's metadata.
    async fn update_run(&self, run: &Run) -> Result<(), AppError>;

    /// Push a batch of points. Atomic per batch; the server deduplicates by
    /// `(user, run, time)` so at-least-once delivery is safe.
    async fn push_points(
        &self,
        user_id: u64,
        run_id: u64,
        batch: &[PathPoint],
    ) -> Result<(), AppError>;

    /// Pull points with `time > since` (exclusive-below).
    async fn pull_points(
        &self,
        user_id: u64,
        run_id: u64,
        since: Option<i64>,
    ) -> Result<Vec<PathPoint>, AppError>;

    async fn runs(&self, user_id: u64) -> Result<Vec<Run>, AppError>;

    async fn runs_since(&self, user_id: u64, since: i64) -> Result<Vec<Run>, AppError>;

    async fn unfinished(&self, user_id: u64) -> Result<Vec<Run>, AppError>;

    async fn delete_run(&self, user_id: u64, run_id: u64) -> Result<(), AppError>;
}

/// HTTP client for the run service.
#[derive(Clone)]
pub struct RunApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl RunApiClient {
    /// Create a client authenticated as one user via a bearer session token.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, AppError> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await
            .map_err(|e| AppError::Disconnected(e.to_string()))?;
        Self::check_response_json(response).await
    }

    async fn post_json<B: serde::Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AppError> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Disconnected(e.to_string()))?;
        Self::check_response_json(response).await
    }

    /// Map an HTTP status onto the error taxonomy and decode the body.
    async fn check_response_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, AppError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| AppError::Disconnected(format!("malformed response: {}", e)));
        }

        let body = response.text().await.unwrap_or_default();
        Err(match status.as_u16() {
            401 | 403 => AppError::Unauthorized,
            404 => AppError::NotFound(body),
            409 => AppError::Conflict(body),
            400 | 422 => AppError::Validation(body),
            _ => AppError::Internal(anyhow::anyhow!(
                "run service returned {}: {}",
                status,
                body
            )),
        })
    }
}

impl RemoteRunApi for RunApiClient {
    async fn create_run(&self, run: &Run) -> Result<(), AppError> {
        let request = CreateRunRequest {
            id: run.id,
            event: run.event_id,
            room: run.room_id,
            start: run.start,
        };
        let _: CreateRunResponse = self.post_json("/run/create", &request).await?;
        Ok(())
    }

    async fn update_run(&self, run: &Run) -> Result<(), AppError> {
        let request = RunUpdateRequest {
            run: run.id,
            points: Vec::new(),
            meta: Some(RunMetaPatch {
                start: run.start,
                running: Some(run.running),
                end: run.end,
                paused: Some(run.paused),
                cur: run.cur,
                penalty: run.penalty,
                location: run.location.clone(),
            }),
        };
        let _: RunUpdateResponse = self.post_json("/run/update", &request).await?;
        Ok(())
    }

    async fn push_points(
        &self,
        _user_id: u64,
        run_id: u64,
        batch: &[PathPoint],
    ) -> Result<(), AppError> {
        let request = RunUpdateRequest {
            run: run_id,
            points: batch.to_vec(),
            meta: None,
        };
        let _: RunUpdateResponse = self.post_json("/run/update", &request).await?;
        Ok(())
    }

    async fn pull_points(
        &self,
        _user_id: u64,
        run_id: u64,
        since: Option<i64>,
    ) -> Result<Vec<PathPoint>, AppError> {
        let mut query = vec![("run", run_id.to_string())];
        if let Some(since) = since {
            query.push(("since", since.to_string()));
        }
        let response: PointsResponse = self.get_json("/run/getupdate", &query).await?;
        Ok(response.points)
    }

    async fn runs(&self, _user_id: u64) -> Result<Vec<Run>, AppError> {
        // The listing is cursor-paginated; walk every page.
        let mut runs = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut query = Vec::new();
            if let Some(cursor) = &cursor {
                query.push(("cursor", cursor.clone()));
            }
            let page: RunsResponse = self.get_json("/run/all", &query).await?;
            runs.extend(page.runs);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(runs),
            }
        }
    }

    async fn runs_since(&self, _user_id: u64, since: i64) -> Result<Vec<Run>, AppError> {
        self.get_json("/run/since", &[("since", since.to_string())])
            .await
    }

    async fn unfinished(&self, _user_id: u64) -> Result<Vec<Run>, AppError> {
        self.get_json("/run/unfinished", &[]).await
    }

    async fn delete_run(&self, _user_id: u64, run_id: u64) -> Result<(), AppError> {
        let _: DeleteRunResponse = self
            .get_json(&format!("/run/delete/{}", run_id), &[])
            .await?;
        Ok(())
    }
}
