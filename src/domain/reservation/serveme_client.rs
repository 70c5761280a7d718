use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::api::reservation_dto::{ReservationDto, ReservationRequestDto, ReservationResponseDto};
use crate::config::Settings;
use crate::domain::reservation::reservation::{
    Reservation, ReservationDraft, ReservationId, ReservationStatus, ReservationWindow, ServerCandidates, flatten_errors, format_time, parse_time,
    reports_ended,
};
use crate::domain::reservation::reservation_client::ReservationClient;
use crate::domain::utils::id::SteamId;
use crate::error::{Error, Rejection, Result};

#[derive(Debug, Clone, Copy)]
pub enum ServemeEndpoint {
    New,
    FindServers,
    Reservations,
    Reservation(ReservationId),
}

impl ServemeEndpoint {
    pub fn path(&self) -> String {
        match self {
            Self::New => "/api/reservations/new".to_string(),
            Self::FindServers => "/api/reservations/find_servers".to_string(),
            Self::Reservations => "/api/reservations".to_string(),
            Self::Reservation(id) => format!("/api/reservations/{}", id),
        }
    }
}

/// JSON-over-HTTP client for the reservation service.
///
/// The underlying `reqwest::Client` pools connections and is cheap to clone, so
/// one instance is shared by every match workflow.
#[derive(Debug, Clone)]
pub struct ServemeClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ServemeClient {
    pub fn new(host: &str, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", host.trim_end_matches('/'))
        };

        Ok(Self { http, base_url, api_key: api_key.into() })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(&settings.serveme_host, settings.serveme_api_key.clone(), settings.request_timeout)
    }

    fn request(&self, method: Method, endpoint: ServemeEndpoint, identity: &SteamId) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, endpoint.path());
        log::debug!("{} {}", method, url);
        self.http
            .request(method, url)
            .query(&[("api_key", self.api_key.as_str()), ("steam_uid", identity.as_str())])
            .header(reqwest::header::ACCEPT, "*/*")
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        request.send().await.map_err(|e| {
            let what = if e.is_timeout() { "timed out" } else { "failed" };
            Error::Transport(format!("reservation request {}: {}", what, e))
        })
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let body = response.bytes().await.map_err(|e| Error::Transport(format!("failed to read response body: {}", e)))?;
        serde_json::from_slice(&body).map_err(|e| Error::Decode(format!("malformed reservation response: {}", e)))
    }

    /// Raw reservation object. `status`, `ended` and `artifact_url` read single fields from it,
    /// so they answer even when the rest would not decode.
    async fn fetch_dto(&self, id: ReservationId, identity: &SteamId) -> Result<ReservationDto> {
        let response = self.send(self.request(Method::GET, ServemeEndpoint::Reservation(id), identity)).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(Rejection::NotFound.into()),
            status if status.is_success() => {
                let dto: ReservationResponseDto = Self::decode(response).await?;
                Ok(dto.reservation)
            }
            _ => Err(Self::rejection(response).await),
        }
    }

    /// Turns a non-success response into a rejection, keeping the service's error payload.
    async fn rejection(response: reqwest::Response) -> Error {
        let status = response.status().as_u16();
        let errors = match response.bytes().await {
            Ok(body) => serde_json::from_slice::<ReservationResponseDto>(&body)
                .map(|dto| flatten_errors(dto.reservation.errors.as_ref()))
                .unwrap_or_default(),
            Err(_) => Default::default(),
        };
        Error::Rejected(Rejection::Reservation { status, errors })
    }
}

#[async_trait]
impl ReservationClient for ServemeClient {
    async fn query_upcoming_window(&self, identity: &SteamId) -> Result<ReservationWindow> {
        let response = self.send(self.request(Method::GET, ServemeEndpoint::New, identity)).await?;
        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }
        let dto: ReservationResponseDto = Self::decode(response).await?;
        let starts = parse_time(&dto.reservation.starts_at)?;
        let ends = parse_time(&dto.reservation.ends_at)?;
        Ok(ReservationWindow { starts, ends })
    }

    async fn find_servers(&self, window: &ReservationWindow, identity: &SteamId) -> Result<ServerCandidates> {
        let skeleton = ReservationDto { starts_at: format_time(&window.starts), ends_at: format_time(&window.ends), ..Default::default() };
        let request = self.request(Method::POST, ServemeEndpoint::FindServers, identity).json(&ReservationRequestDto { reservation: &skeleton });

        let response = self.send(request).await?;
        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }
        let dto: ReservationResponseDto = Self::decode(response).await?;
        Ok(ServerCandidates::from(dto))
    }

    async fn create(&self, draft: &ReservationDraft, identity: &SteamId) -> Result<Reservation> {
        let body = draft.to_dto();
        let request = self.request(Method::POST, ServemeEndpoint::Reservations, identity).json(&ReservationRequestDto { reservation: &body });

        let response = self.send(request).await?;
        match response.status() {
            StatusCode::BAD_REQUEST => Err(Rejection::AlreadyReserved.into()),
            StatusCode::NOT_FOUND => Err(Rejection::NotFound.into()),
            status if status.is_success() => {
                let dto: ReservationResponseDto = Self::decode(response).await?;
                let reservation = Reservation::try_from(dto.reservation)?;
                log::info!("Created reservation {} on server {:?} ({}).", reservation.id, reservation.server_id, reservation.status);
                Ok(reservation)
            }
            _ => Err(Self::rejection(response).await),
        }
    }

    async fn fetch(&self, id: ReservationId, identity: &SteamId) -> Result<Reservation> {
        Reservation::try_from(self.fetch_dto(id, identity).await?)
    }

    async fn status(&self, id: ReservationId, identity: &SteamId) -> Result<ReservationStatus> {
        let dto = self.fetch_dto(id, identity).await?;
        match dto.status {
            Some(raw) => raw.parse(),
            None => Err(Error::Decode(format!("reservation {} carries no status", id))),
        }
    }

    async fn ended(&self, id: ReservationId, identity: &SteamId) -> Result<bool> {
        Ok(reports_ended(&self.fetch_dto(id, identity).await?))
    }

    async fn artifact_url(&self, id: ReservationId, identity: &SteamId) -> Result<Option<String>> {
        let dto = self.fetch_dto(id, identity).await?;
        if !reports_ended(&dto) {
            return Ok(None);
        }
        Ok(dto.zipfile_url.filter(|url| !url.is_empty()))
    }

    async fn delete(&self, id: ReservationId, identity: &SteamId) -> Result<()> {
        let response = self.send(self.request(Method::DELETE, ServemeEndpoint::Reservation(id), identity)).await?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            log::info!("Released reservation {} (status {}).", id, status.as_u16());
            return Ok(());
        }
        Err(Self::rejection(response).await)
    }
}
