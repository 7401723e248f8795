use std::sync::Arc;

use error_stack::Report;
use poem::get;
use poem::handler;
use poem::http::StatusCode;
use poem::listener::TcpListener;
use poem::web::Data;
use poem::EndpointExt;
use poem::IntoResponse;
use poem::Response;
use poem::Route;
use poem::Server;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::Checker;
use super::HealthError;

/// 204 when every check passes, otherwise 503 with the failure as the body.
#[handler]
async fn health(checker: Data<&Arc<dyn Checker>>) -> Response {
    match checker.check() {
        Ok(()) => {
            debug!("Health check passed");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(report) => {
            let message = report.current_context().to_string();
            warn!("Health check failed: {report:?}");
            message
                .with_status(StatusCode::SERVICE_UNAVAILABLE)
                .into_response()
        }
    }
}

fn routes(checker: Arc<dyn Checker>) -> impl poem::Endpoint {
    Route::new().at("/health", get(health)).data(checker)
}

/// HTTP server exposing `GET /health`
pub struct HealthServer {
    checker: Arc<dyn Checker>,
    listen_addr: String,
}

impl HealthServer {
    pub fn new(checker: Arc<dyn Checker>, listen_addr: String) -> Self {
        Self {
            checker,
            listen_addr,
        }
    }

    /// Serve until the token is cancelled.
    ///
    /// # Errors
    ///
    /// - [`HealthError::ServerError`] if the server fails to bind or stops unexpectedly
    pub async fn run(
        self,
        cancellation_token: CancellationToken,
    ) -> Result<(), Report<HealthError>> {
        info!("Starting health server on {}", self.listen_addr);

        let server = Server::new(TcpListener::bind(&self.listen_addr));

        tokio::select! {
            result = server.run(routes(self.checker)) => {
                result.map_err(|e| {
                    error!("Health server failed: {e}");
                    Report::new(HealthError::ServerError {
                        message: format!("Server failed: {e}"),
                    })
                })
            }
            _ = cancellation_token.cancelled() => {
                info!("Health server shutdown requested");
                Ok(())
            }
        }
    }
}
