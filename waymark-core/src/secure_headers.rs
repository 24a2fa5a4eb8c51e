//! Security response headers, installed as the `waymark:security-headers`
//! default middleware.
//!
//! # Default headers
//!
//! | Header | Value |
//! |--------|-------|
//! | `Content-Security-Policy` | see [`DEFAULT_CSP`] |
//! | `Cross-Origin-Opener-Policy` | `same-origin` |
//! | `Cross-Origin-Resource-Policy` | `same-origin` |
//! | `Referrer-Policy` | `no-referrer` |
//! | `Strict-Transport-Security` | `max-age=31536000; includeSubDomains` |
//! | `X-Content-Type-Options` | `nosniff` |
//! | `X-DNS-Prefetch-Control` | `off` |
//! | `X-Frame-Options` | `SAMEORIGIN` |
//! | `X-Permitted-Cross-Domain-Policies` | `none` |
//! | `X-XSS-Protection` | `0` |
//!
//! # Usage
//!
//! ```ignore
//! // From configuration (what the default middleware does)
//! let headers = SecureHeaders::from_options(&config.security_headers);
//!
//! // Custom configuration
//! let headers = SecureHeaders::builder()
//!     .hsts_max_age(63072000)
//!     .frame_options("DENY")
//!     .no_content_security_policy()
//!     .build();
//! ```

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue};

use crate::config::SecurityHeaderOptions;
use crate::http::{Request, Response, Router};
use crate::middleware::LayerFn;

pub const DEFAULT_CSP: &str = "default-src 'self';base-uri 'self';font-src 'self' https: data:;\
form-action 'self';frame-ancestors 'self';img-src 'self' data:;object-src 'none';\
script-src 'self';script-src-attr 'none';style-src 'self' https: 'unsafe-inline';\
upgrade-insecure-requests";

/// A resolved set of security headers.
///
/// Use `SecureHeaders::default()` for the defaults above,
/// [`SecureHeaders::from_options`] for configuration-driven headers, or
/// `SecureHeaders::builder()` for custom configuration.
#[derive(Debug, Clone)]
pub struct SecureHeaders {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl SecureHeaders {
    /// Create a builder for custom header configuration.
    pub fn builder() -> SecureHeadersBuilder {
        SecureHeadersBuilder::new()
    }

    pub fn from_options(options: &SecurityHeaderOptions) -> Self {
        let mut builder = SecureHeadersBuilder::new();
        builder.content_security_policy = options.content_security_policy.resolve(DEFAULT_CSP);
        builder.cross_origin_opener_policy =
            options.cross_origin_opener_policy.resolve("same-origin");
        builder.cross_origin_resource_policy =
            options.cross_origin_resource_policy.resolve("same-origin");
        builder.referrer_policy = options.referrer_policy.resolve("no-referrer");
        builder.frame_options = options.frame_options.resolve("SAMEORIGIN");
        builder.permitted_cross_domain_policies =
            options.permitted_cross_domain_policies.resolve("none");
        builder.hsts = options.strict_transport_security;
        builder.hsts_max_age = options.hsts_max_age;
        builder.hsts_include_subdomains = options.hsts_include_subdomains;
        builder.content_type_options = options.content_type_options;
        builder.dns_prefetch_control = options.dns_prefetch_control;
        builder.xss_protection = options.xss_protection;
        builder.permissions_policy = options.permissions_policy.clone();
        builder.build()
    }

    /// Returns a reference to the collected headers.
    pub fn headers(&self) -> &[(HeaderName, HeaderValue)] {
        &self.headers
    }

    /// Set every header on `response`, replacing values set downstream.
    pub fn apply(&self, response: &mut Response) {
        for (name, value) in &self.headers {
            response.headers_mut().insert(name.clone(), value.clone());
        }
    }

    /// Wrap the router so every response (404 and error responses included)
    /// carries the headers.
    pub fn into_layer(self) -> LayerFn {
        let headers = Arc::new(self);
        Arc::new(move |router: Router| {
            let headers = headers.clone();
            router.layer(axum::middleware::from_fn(
                move |req: Request, next: axum::middleware::Next| {
                    let headers = headers.clone();
                    async move {
                        let mut response = next.run(req).await;
                        headers.apply(&mut response);
                        response
                    }
                },
            ))
        })
    }
}

impl Default for SecureHeaders {
    fn default() -> Self {
        SecureHeadersBuilder::new().build()
    }
}

/// Builder for [`SecureHeaders`].
pub struct SecureHeadersBuilder {
    content_security_policy: Option<String>,
    cross_origin_opener_policy: Option<String>,
    cross_origin_resource_policy: Option<String>,
    referrer_policy: Option<String>,
    frame_options: Option<String>,
    permitted_cross_domain_policies: Option<String>,
    hsts: bool,
    hsts_max_age: u64,
    hsts_include_subdomains: bool,
    content_type_options: bool,
    dns_prefetch_control: bool,
    xss_protection: bool,
    permissions_policy: Option<String>,
}

impl SecureHeadersBuilder {
    fn new() -> Self {
        Self {
            content_security_policy: Some(DEFAULT_CSP.to_string()),
            cross_origin_opener_policy: Some("same-origin".to_string()),
            cross_origin_resource_policy: Some("same-origin".to_string()),
            referrer_policy: Some("no-referrer".to_string()),
            frame_options: Some("SAMEORIGIN".to_string()),
            permitted_cross_domain_policies: Some("none".to_string()),
            hsts: true,
            hsts_max_age: 31536000,
            hsts_include_subdomains: true,
            content_type_options: true,
            dns_prefetch_control: true,
            xss_protection: true,
            permissions_policy: None,
        }
    }

    /// Set `Content-Security-Policy`.
    pub fn content_security_policy(mut self, value: impl Into<String>) -> Self {
        self.content_security_policy = Some(value.into());
        self
    }

    /// Disable `Content-Security-Policy`.
    pub fn no_content_security_policy(mut self) -> Self {
        self.content_security_policy = None;
        self
    }

    /// Set the `X-Frame-Options` value (e.g. `"DENY"`, `"SAMEORIGIN"`).
    pub fn frame_options(mut self, value: impl Into<String>) -> Self {
        self.frame_options = Some(value.into());
        self
    }

    /// Disable `X-Frame-Options`.
    pub fn no_frame_options(mut self) -> Self {
        self.frame_options = None;
        self
    }

    /// Enable or disable `Strict-Transport-Security`.
    pub fn hsts(mut self, enabled: bool) -> Self {
        self.hsts = enabled;
        self
    }

    /// Set the `max-age` value for HSTS (in seconds).
    pub fn hsts_max_age(mut self, seconds: u64) -> Self {
        self.hsts_max_age = seconds;
        self
    }

    /// Enable or disable `includeSubDomains` in the HSTS header.
    pub fn hsts_include_subdomains(mut self, include: bool) -> Self {
        self.hsts_include_subdomains = include;
        self
    }

    /// Enable or disable `X-Content-Type-Options: nosniff`.
    pub fn content_type_options(mut self, enabled: bool) -> Self {
        self.content_type_options = enabled;
        self
    }

    /// Set `Referrer-Policy`.
    pub fn referrer_policy(mut self, value: impl Into<String>) -> Self {
        self.referrer_policy = Some(value.into());
        self
    }

    /// Set `Permissions-Policy`.
    pub fn permissions_policy(mut self, value: impl Into<String>) -> Self {
        self.permissions_policy = Some(value.into());
        self
    }

    /// Build the [`SecureHeaders`] set.
    ///
    /// Values that are not valid header values are skipped.
    pub fn build(self) -> SecureHeaders {
        let mut headers = Vec::new();
        let mut push = |name: &'static str, value: &str| {
            if let Ok(val) = HeaderValue::from_str(value) {
                headers.push((HeaderName::from_static(name), val));
            }
        };

        if let Some(ref csp) = self.content_security_policy {
            push("content-security-policy", csp);
        }
        if let Some(ref coop) = self.cross_origin_opener_policy {
            push("cross-origin-opener-policy", coop);
        }
        if let Some(ref corp) = self.cross_origin_resource_policy {
            push("cross-origin-resource-policy", corp);
        }
        if let Some(ref rp) = self.referrer_policy {
            push("referrer-policy", rp);
        }
        if self.hsts {
            let value = if self.hsts_include_subdomains {
                format!("max-age={}; includeSubDomains", self.hsts_max_age)
            } else {
                format!("max-age={}", self.hsts_max_age)
            };
            push("strict-transport-security", &value);
        }
        if self.content_type_options {
            push("x-content-type-options", "nosniff");
        }
        if self.dns_prefetch_control {
            push("x-dns-prefetch-control", "off");
        }
        if let Some(ref fo) = self.frame_options {
            push("x-frame-options", fo);
        }
        if let Some(ref pcdp) = self.permitted_cross_domain_policies {
            push("x-permitted-cross-domain-policies", pcdp);
        }
        if self.xss_protection {
            push("x-xss-protection", "0");
        }
        if let Some(ref pp) = self.permissions_policy {
            push("permissions-policy", pp);
        }

        SecureHeaders { headers }
    }
}
