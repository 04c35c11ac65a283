// src/monitoring/logging.rs

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

/// Filtre utilisé quand `RUST_LOG` n'est pas défini : notre crate en `info`,
/// les dépendances HTTP en `warn` pour ne pas noyer les cycles de polling.
const DEFAULT_FILTER: &str = "info,flowgraph=info,reqwest=warn,hyper=warn";

/// Installe le subscriber global. Le format JSON est destiné aux collecteurs,
/// le format texte au développement local (`LOG_FORMAT=pretty`).
pub fn setup_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let pretty = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("pretty"))
        .unwrap_or(false);

    // `try_init` : un second appel (tests, binaire relancé) ne doit pas paniquer.
    let result = if pretty {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .with_target(true)
            .try_init()
    };

    if let Err(e) = result {
        eprintln!("[Logging] Subscriber déjà installé: {}", e);
    }
}
