use waymark_core::secure_headers::{SecureHeaders, DEFAULT_CSP};
use waymark_core::{HeaderToggle, SecurityHeaderOptions};

fn header_names(sh: &SecureHeaders) -> Vec<String> {
    sh.headers().iter().map(|(n, _)| n.to_string()).collect()
}

fn value(sh: &SecureHeaders, name: &str) -> Option<String> {
    sh.headers()
        .iter()
        .find(|(n, _)| n.as_str() == name)
        .map(|(_, v)| v.to_str().unwrap().to_string())
}

#[test]
fn defaults_cover_every_header_family() {
    let sh = SecureHeaders::default();
    assert_eq!(
        header_names(&sh),
        [
            "content-security-policy",
            "cross-origin-opener-policy",
            "cross-origin-resource-policy",
            "referrer-policy",
            "strict-transport-security",
            "x-content-type-options",
            "x-dns-prefetch-control",
            "x-frame-options",
            "x-permitted-cross-domain-policies",
            "x-xss-protection",
        ]
    );
    assert_eq!(value(&sh, "content-security-policy").as_deref(), Some(DEFAULT_CSP));
    assert_eq!(value(&sh, "x-xss-protection").as_deref(), Some("0"));
    assert_eq!(value(&sh, "x-dns-prefetch-control").as_deref(), Some("off"));
}

#[test]
fn default_options_match_the_default_set() {
    let from_options = SecureHeaders::from_options(&SecurityHeaderOptions::default());
    assert_eq!(header_names(&from_options), header_names(&SecureHeaders::default()));
}

#[test]
fn builder_overrides() {
    let sh = SecureHeaders::builder()
        .content_security_policy("default-src 'self'")
        .frame_options("DENY")
        .referrer_policy("same-origin")
        .permissions_policy("geolocation=()")
        .hsts_max_age(60000)
        .hsts_include_subdomains(false)
        .build();
    assert_eq!(value(&sh, "content-security-policy").as_deref(), Some("default-src 'self'"));
    assert_eq!(value(&sh, "x-frame-options").as_deref(), Some("DENY"));
    assert_eq!(value(&sh, "referrer-policy").as_deref(), Some("same-origin"));
    assert_eq!(value(&sh, "permissions-policy").as_deref(), Some("geolocation=()"));
    assert_eq!(value(&sh, "strict-transport-security").as_deref(), Some("max-age=60000"));
}

#[test]
fn builder_disables_single_headers() {
    let sh = SecureHeaders::builder()
        .no_content_security_policy()
        .no_frame_options()
        .hsts(false)
        .content_type_options(false)
        .build();
    let names = header_names(&sh);
    for gone in [
        "content-security-policy",
        "x-frame-options",
        "strict-transport-security",
        "x-content-type-options",
    ] {
        assert!(!names.iter().any(|n| n == gone), "{gone} still present");
    }
    assert!(names.iter().any(|n| n == "referrer-policy"));
}

#[test]
fn options_toggle_each_family_independently() {
    let options = SecurityHeaderOptions {
        content_security_policy: HeaderToggle::Value("default-src 'none'".into()),
        cross_origin_opener_policy: HeaderToggle::Enabled(false),
        dns_prefetch_control: false,
        xss_protection: false,
        ..SecurityHeaderOptions::default()
    };
    let sh = SecureHeaders::from_options(&options);
    assert_eq!(value(&sh, "content-security-policy").as_deref(), Some("default-src 'none'"));
    assert!(value(&sh, "cross-origin-opener-policy").is_none());
    assert!(value(&sh, "x-dns-prefetch-control").is_none());
    assert!(value(&sh, "x-xss-protection").is_none());
    assert_eq!(value(&sh, "cross-origin-resource-policy").as_deref(), Some("same-origin"));
    assert_eq!(header_names(&sh).len(), 7);
}

#[test]
fn invalid_values_are_skipped() {
    let sh = SecureHeaders::builder().frame_options("bad\nvalue").build();
    assert!(value(&sh, "x-frame-options").is_none());
    assert!(value(&sh, "x-content-type-options").is_some());
}
