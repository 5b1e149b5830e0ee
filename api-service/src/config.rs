use anyhow::{anyhow, Context, Result};
use axum::http::HeaderName;
use oidc_auth::{AudiencePolicy, IdpConfig, RefreshConfig};
use std::env;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub idp: IdpConfig,
    pub refresh: RefreshConfig,
    pub host: IpAddr,
    pub port: u16,
}

impl ServiceConfig {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from((self.host, self.port))
    }
}

pub fn load_service_config() -> Result<ServiceConfig> {
    load_from(|key| env::var(key).ok())
}

/// Build the service config from an arbitrary variable source.
pub fn load_from<F>(lookup: F) -> Result<ServiceConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| lookup(key).and_then(|value| normalize_optional(&value));
    let required = |key: &str| var(key).with_context(|| format!("{key} must be set"));

    let mut idp = IdpConfig::new(
        required("IDP_SERVER_URL")?,
        required("IDP_REALM")?,
        required("IDP_CLIENT_ID")?,
    );
    if let Some(secret) = var("IDP_CLIENT_SECRET") {
        idp = idp.with_client_secret(secret);
    }
    if let Some(policy) = var("IDP_AUDIENCE_POLICY") {
        idp = idp.with_audience_policy(
            parse_audience_policy(&policy).context("Failed to parse IDP_AUDIENCE_POLICY")?,
        );
    }
    if let Some(leeway) = var("IDP_LEEWAY_SECONDS") {
        idp = idp.with_leeway(
            leeway
                .parse()
                .context("Failed to parse IDP_LEEWAY_SECONDS")?,
        );
    }
    if let Some(ttl) = var("IDP_KEY_CACHE_TTL_SECONDS") {
        let seconds: u64 = ttl
            .parse()
            .context("Failed to parse IDP_KEY_CACHE_TTL_SECONDS")?;
        idp = idp.with_key_cache_ttl(Duration::from_secs(seconds));
    }
    if let Some(cooldown) = var("IDP_KEY_REFETCH_COOLDOWN_SECONDS") {
        let seconds: u64 = cooldown
            .parse()
            .context("Failed to parse IDP_KEY_REFETCH_COOLDOWN_SECONDS")?;
        idp = idp.with_key_refetch_cooldown(Duration::from_secs(seconds));
    }

    let mut refresh = RefreshConfig::default();
    if let Some(header) = var("AUTH_REFRESH_HEADER") {
        let name = HeaderName::try_from(header.to_ascii_lowercase())
            .map_err(|err| anyhow!("Invalid AUTH_REFRESH_HEADER '{header}': {err}"))?;
        refresh = refresh.with_refresh_header(name);
    }
    if let Some(cookie) = var("AUTH_REFRESH_COOKIE_NAME") {
        refresh = refresh.with_refresh_cookie(cookie);
    }
    if let Some(flag) = var("AUTH_REFRESH_ON_INVALID") {
        refresh = refresh.with_refresh_on_invalid(parse_bool(&flag));
    }

    let host = var("HOST")
        .unwrap_or_else(|| "0.0.0.0".to_string())
        .parse()
        .context("Failed to parse HOST")?;
    let port = match var("PORT") {
        Some(port) => port.parse().context("Failed to parse PORT")?,
        None => 8080,
    };

    Ok(ServiceConfig {
        idp,
        refresh,
        host,
        port,
    })
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn normalize_optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_audience_policy(value: &str) -> Result<AudiencePolicy> {
    match value.trim().to_ascii_lowercase().as_str() {
        "enforce" | "strict" => Ok(AudiencePolicy::Enforce),
        "tolerate" | "lenient" => Ok(AudiencePolicy::Tolerate),
        other => Err(anyhow!(
            "Unsupported audience policy '{other}'. Use enforce or tolerate."
        )),
    }
}
