//! Request cookie policy
//!
//! Configured cookies are written into a temporary container's jar right
//! before a matching request sends its headers, then appended to the
//! `Cookie` header if the jar accepted them.

use crate::error::CookieApplyError;
use crate::host::CookieHost;
use crate::lifecycle::ContainerLifecycle;
use crate::types::{ContainerId, CookieDetails, CookieQuery, HttpHeader, SameSite, SendHeadersDetails};
use std::sync::Arc;
use tmpc_preferences::{ConfiguredCookie, Preferences};

/// Turn a stored cookie entry into a host write request
///
/// Empty strings mean "unspecified"; `"true"`/`"false"` become booleans and
/// the expiration date is parsed as seconds.
///
/// # Errors
/// - `CookieApplyError::InvalidField` if a field does not parse
pub fn normalize(
    cookie: &ConfiguredCookie,
    store_id: &ContainerId,
) -> Result<CookieDetails, CookieApplyError> {
    let invalid = |field: &'static str, value: &str| CookieApplyError::InvalidField {
        name: cookie.name.clone(),
        field,
        value: value.to_string(),
    };
    let flag = |field: &'static str, value: &str| match value {
        "" => Ok(None),
        "true" => Ok(Some(true)),
        "false" => Ok(Some(false)),
        other => Err(invalid(field, other)),
    };

    let same_site = match cookie.same_site.as_str() {
        "" => None,
        "no_restriction" => Some(SameSite::NoRestriction),
        "lax" => Some(SameSite::Lax),
        "strict" => Some(SameSite::Strict),
        other => return Err(invalid("sameSite", other)),
    };
    let expiration_date = match cookie.expiration_date.as_str() {
        "" => None,
        raw => Some(
            raw.trim()
                .parse::<f64>()
                .map_err(|_| invalid("expirationDate", raw))?,
        ),
    };

    Ok(CookieDetails {
        url: cookie.url.clone(),
        store_id: Some(store_id.clone()),
        name: non_empty(&cookie.name),
        value: non_empty(&cookie.value),
        domain: non_empty(&cookie.domain),
        path: non_empty(&cookie.path),
        secure: flag("secure", &cookie.secure)?,
        http_only: flag("httpOnly", &cookie.http_only)?,
        same_site,
        expiration_date,
        first_party_domain: non_empty(&cookie.first_party_domain),
    })
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Add `name=value` to the cookie header; false if already present
fn append_cookie(headers: &mut Vec<HttpHeader>, name: &str, value: &str) -> bool {
    let pair = format!("{name}={value}");
    match headers
        .iter_mut()
        .find(|h| h.name.eq_ignore_ascii_case("cookie"))
    {
        Some(header) if header.value.split(';').any(|p| p.trim() == pair) => false,
        Some(header) if header.value.trim().is_empty() => {
            header.value = pair;
            true
        }
        Some(header) => {
            header.value = format!("{}; {pair}", header.value);
            true
        }
        None => {
            headers.push(HttpHeader::new("Cookie", pair));
            true
        }
    }
}

/// Applies configured cookies to requests from temporary containers
pub struct RequestCookieEnforcer {
    cookies: Arc<dyn CookieHost>,
    lifecycle: Arc<ContainerLifecycle>,
}

impl std::fmt::Debug for RequestCookieEnforcer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCookieEnforcer").finish_non_exhaustive()
    }
}

impl RequestCookieEnforcer {
    /// Enforcer writing through the cookie host
    #[must_use]
    pub fn new(cookies: Arc<dyn CookieHost>, lifecycle: Arc<ContainerLifecycle>) -> Self {
        Self { cookies, lifecycle }
    }

    /// Headers to send instead of the original ones, if anything changed
    ///
    /// Per-cookie failures are logged and skipped.
    #[tracing::instrument(level = "debug", skip_all, fields(url = %details.url, container = %details.cookie_store_id))]
    pub async fn apply(
        &self,
        prefs: &Preferences,
        details: &SendHeadersDetails,
    ) -> Option<Vec<HttpHeader>> {
        if !self.lifecycle.is_temporary(&details.cookie_store_id) {
            return None;
        }
        let configured: Vec<&ConfiguredCookie> = prefs.cookies.cookies_for(&details.url).collect();
        if configured.is_empty() {
            return None;
        }

        let mut headers = details.request_headers.clone();
        let mut changed = false;
        for cookie in configured {
            match self.apply_one(cookie, details).await {
                Ok(Some((name, value))) => changed |= append_cookie(&mut headers, &name, &value),
                Ok(None) => {
                    tracing::debug!(cookie = %cookie.name, "cookie not in jar after set");
                }
                Err(e) => tracing::warn!(error = %e, "failed to apply configured cookie"),
            }
        }
        changed.then_some(headers)
    }

    async fn apply_one(
        &self,
        cookie: &ConfiguredCookie,
        details: &SendHeadersDetails,
    ) -> Result<Option<(String, String)>, CookieApplyError> {
        let host_error = |source| CookieApplyError::Host {
            name: cookie.name.clone(),
            source,
        };
        let write = normalize(cookie, &details.cookie_store_id)?;
        let first_party_domain = write.first_party_domain.clone();
        self.cookies.set(write).await.map_err(host_error)?;

        let stored = self
            .cookies
            .get(CookieQuery {
                url: details.url.clone(),
                name: cookie.name.clone(),
                store_id: details.cookie_store_id.clone(),
                first_party_domain,
            })
            .await
            .map_err(host_error)?;
        Ok(stored.map(|c| (c.name, c.value)))
    }
}
