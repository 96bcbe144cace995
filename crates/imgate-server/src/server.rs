use std::{net::SocketAddr, sync::Arc};

use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRef},
    middleware,
    routing::get,
};
use imgate_auth::{AuthState, CapabilityTokens, IntrospectionEngine, require_authorization};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::AppConfig;
use crate::dicomweb::{DicomWebProvider, ImagingResourceFormatter, wado};
use crate::handlers;

/// Shared state for every route.
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthState,
    pub provider: Arc<DicomWebProvider>,
    pub formatter: Arc<ImagingResourceFormatter>,
    /// Verifies the tokens the formatter issues; both share one key.
    pub capabilities: Arc<CapabilityTokens>,
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

impl AppState {
    /// Wires the composition root: one engine, one archive client and one
    /// capability key shared by issuer and verifier.
    pub fn new(
        engine: Arc<IntrospectionEngine>,
        provider: DicomWebProvider,
        capabilities: Arc<CapabilityTokens>,
        wado_base: impl Into<String>,
    ) -> Self {
        Self {
            auth: AuthState::new(engine),
            provider: Arc::new(provider),
            formatter: Arc::new(ImagingResourceFormatter::new(
                Arc::clone(&capabilities),
                wado_base,
            )),
            capabilities,
        }
    }
}

pub struct ImgateServer {
    addr: SocketAddr,
    app: Router,
}

pub fn build_app(state: AppState, cfg: &AppConfig) -> Router {
    let body_limit = cfg.server.body_limit_bytes;

    let imaging_studies = Router::new()
        .route("/ImagingStudy", get(handlers::search_imaging_studies))
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            require_authorization,
        ));

    Router::new()
        .route("/healthz", get(handlers::healthz))
        .merge(imaging_studies)
        .route("/wado/{token}/studies/{uid}", get(wado::retrieve_study))
        .route(
            "/wado/{token}/studies/{uid}/{*rest}",
            get(wado::retrieve_study_resource),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    // The WADO path carries a capability token; log the route shape only.
                    let path = req.uri().path();
                    let target = if path.starts_with("/wado/") {
                        "/wado/{token}/studies/..."
                    } else {
                        path
                    };
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %target,
                        http.status_code = Empty,
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(DefaultBodyLimit::max(body_limit))
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
    capabilities: Option<Arc<CapabilityTokens>>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
            capabilities: None,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Uses an explicit capability key instead of a fresh per-process one.
    pub fn with_capability_tokens(mut self, tokens: CapabilityTokens) -> Self {
        self.capabilities = Some(Arc::new(tokens));
        self
    }

    /// Builds the HTTP client, the authorization engine and the router.
    pub fn build(self) -> anyhow::Result<ImgateServer> {
        let state = self.build_state()?;
        let app = build_app(state, &self.config);
        Ok(ImgateServer {
            addr: self.addr,
            app,
        })
    }

    /// Builds only the application state, for embedding the router elsewhere.
    pub fn build_state(&self) -> anyhow::Result<AppState> {
        let cfg = &self.config;
        cfg.validate().map_err(anyhow::Error::msg)?;

        let http = reqwest::Client::builder()
            .timeout(cfg.http.request_timeout)
            .connect_timeout(cfg.http.connect_timeout)
            .build()?;

        let authorization = cfg
            .authorization
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("authorization section is required"))?;
        let engine = IntrospectionEngine::from_config(
            authorization,
            http.clone(),
            cfg.discovery.clone(),
        )?;

        let capabilities = self
            .capabilities
            .clone()
            .unwrap_or_else(|| Arc::new(CapabilityTokens::generate()));

        let wado_base = cfg.wado_base();
        tracing::info!(
            archive = %cfg.imaging.endpoint,
            lookup = ?cfg.imaging.lookup,
            wado_base = %wado_base,
            "Imaging gateway configured"
        );

        Ok(AppState::new(
            Arc::new(engine),
            DicomWebProvider::new(http, &cfg.imaging),
            capabilities,
            wado_base,
        ))
    }
}

impl ImgateServer {
    pub fn router(&self) -> Router {
        self.app.clone()
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
