//! Purpose: Resolve which store URL the CLI talks to.
//! Exports: `resolve_store_url`, `DEFAULT_STORE_URL`, `STORE_URL_ENV`.
//! Role: Single source for flag > environment > default precedence.
//! Invariants: The default store is the local loopback server on db 0.

pub(crate) const DEFAULT_STORE_URL: &str = "redis://127.0.0.1:6379/0";
pub(crate) const STORE_URL_ENV: &str = "ZSETVIEW_URL";

pub(crate) fn resolve_store_url(flag: Option<String>) -> String {
    pick_store_url(flag, std::env::var(STORE_URL_ENV).ok())
}

fn pick_store_url(flag: Option<String>, env: Option<String>) -> String {
    flag.or(env)
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .unwrap_or_else(|| DEFAULT_STORE_URL.to_string())
}
