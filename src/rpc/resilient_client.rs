use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Réponse HTTP brute : le statut et le corps, sans interprétation.
/// La classification (succès, erreur GraphQL...) reste à la charge de l'appelant.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Un "wrapper" autour du client `reqwest` qui ajoute une logique de
/// ré-essai automatique pour les appels qui échouent à cause d'erreurs réseau temporaires.
#[derive(Clone)]
pub struct ResilientHttpClient {
    client: Client,
    max_retries: u8,
    delay_ms: u64,
}

impl ResilientHttpClient {
    /// Construit un nouveau client HTTP résilient.
    pub fn new(max_retries: u8, delay_ms: u64) -> Self {
        Self {
            client: Client::new(),
            max_retries,
            delay_ms,
        }
    }

    /// Détermine si une erreur du client est temporaire et si une nouvelle tentative doit être effectuée.
    fn is_retryable(error: &reqwest::Error) -> bool {
        error.is_timeout() || error.is_connect() || error.is_request()
    }

    /// Les 5xx et le rate-limit sont ré-essayés, les autres statuts sont renvoyés tels quels.
    fn is_retryable_status(status: StatusCode) -> bool {
        status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
    }

    /// POST d'un corps JSON.
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
        headers: &[(&str, &str)],
    ) -> Result<HttpResponse, reqwest::Error> {
        self.send_with_retry(url, || {
            let mut request = self.client.post(url).json(body);
            for (name, value) in headers {
                request = request.header(*name, *value);
            }
            request
        })
        .await
    }

    /// GET avec paramètres de requête.
    pub async fn get(
        &self,
        url: &str,
        query: &[(&str, &str)],
        headers: &[(&str, &str)],
    ) -> Result<HttpResponse, reqwest::Error> {
        self.send_with_retry(url, || {
            let mut request = self.client.get(url).query(query);
            for (name, value) in headers {
                request = request.header(*name, *value);
            }
            request
        })
        .await
    }

    async fn send_with_retry<F>(&self, url: &str, build: F) -> Result<HttpResponse, reqwest::Error>
    where
        F: Fn() -> RequestBuilder,
    {
        for attempt in 0..=self.max_retries {
            let request = build().timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS));
            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if Self::is_retryable_status(status) && attempt < self.max_retries {
                        warn!(url, %status, attempt, "[HTTP] Statut temporaire, nouvelle tentative.");
                        sleep(Duration::from_millis(self.delay_ms)).await;
                        continue;
                    }
                    let body = response.text().await?;
                    debug!(url, %status, bytes = body.len(), "[HTTP] Réponse reçue.");
                    return Ok(HttpResponse { status, body });
                }
                Err(e) => {
                    if Self::is_retryable(&e) && attempt < self.max_retries {
                        warn!(url, error = %e, attempt, "[HTTP] Erreur réseau, nouvelle tentative.");
                        sleep(Duration::from_millis(self.delay_ms)).await;
                    } else {
                        return Err(e);
                    }
                }
            }
        }
        unreachable!()
    }
}
