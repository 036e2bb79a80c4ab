use std::collections::HashMap;

use super::*;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn memory_backend_needs_no_database_url() {
    let cfg = Config::from_lookup(lookup_from(&[("LEADFLOW_BACKEND", "memory")])).unwrap();
    assert_eq!(cfg.backend, BackendKind::Memory);
    assert_eq!(cfg.port, DEFAULT_PORT);
    assert_eq!(cfg.public_base_url, "http://localhost:3000");
    assert_eq!(cfg.upload_chunk_bytes, DEFAULT_UPLOAD_CHUNK_BYTES);
    assert_eq!(cfg.default_region, DEFAULT_REGION);
    assert!(cfg.resend.is_none());
    assert!(!cfg.cookie_secure);
}

#[test]
fn postgres_backend_requires_database_url() {
    let err = Config::from_lookup(lookup_from(&[])).unwrap_err();
    assert_eq!(err, ConfigError::Missing("DATABASE_URL"));
}

#[test]
fn postgres_backend_reads_pool_size() {
    let cfg = Config::from_lookup(lookup_from(&[
        ("DATABASE_URL", "postgres://u:p@localhost/leadflow"),
        ("DB_MAX_CONNECTIONS", "12"),
    ]))
    .unwrap();
    assert_eq!(
        cfg.backend,
        BackendKind::Postgres { database_url: "postgres://u:p@localhost/leadflow".into(), max_connections: 12 }
    );
}

#[test]
fn unknown_backend_is_rejected() {
    let err = Config::from_lookup(lookup_from(&[("LEADFLOW_BACKEND", "firebase")])).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { key: "LEADFLOW_BACKEND", .. }));
}

#[test]
fn invalid_port_is_rejected() {
    let err = Config::from_lookup(lookup_from(&[("LEADFLOW_BACKEND", "memory"), ("PORT", "http")])).unwrap_err();
    assert_eq!(err, ConfigError::Invalid { key: "PORT", value: "http".into() });
}

#[test]
fn https_base_url_implies_secure_cookie() {
    let cfg = Config::from_lookup(lookup_from(&[
        ("LEADFLOW_BACKEND", "memory"),
        ("PUBLIC_BASE_URL", "https://leads.example.com/"),
    ]))
    .unwrap();
    assert_eq!(cfg.public_base_url, "https://leads.example.com");
    assert!(cfg.cookie_secure);
}

#[test]
fn explicit_cookie_secure_overrides_inference() {
    let cfg = Config::from_lookup(lookup_from(&[
        ("LEADFLOW_BACKEND", "memory"),
        ("PUBLIC_BASE_URL", "https://leads.example.com"),
        ("COOKIE_SECURE", "off"),
    ]))
    .unwrap();
    assert!(!cfg.cookie_secure);
}

#[test]
fn resend_requires_both_key_and_sender() {
    let only_key = Config::from_lookup(lookup_from(&[("LEADFLOW_BACKEND", "memory"), ("RESEND_API_KEY", "re_123")]))
        .unwrap();
    assert!(only_key.resend.is_none());

    let both = Config::from_lookup(lookup_from(&[
        ("LEADFLOW_BACKEND", "memory"),
        ("RESEND_API_KEY", "re_123"),
        ("RESEND_FROM", "LeadFlow <no-reply@example.com>"),
    ]))
    .unwrap();
    assert_eq!(
        both.resend,
        Some(ResendConfig { api_key: "re_123".into(), from: "LeadFlow <no-reply@example.com>".into() })
    );
}

#[test]
fn ttl_overrides_are_parsed() {
    let cfg = Config::from_lookup(lookup_from(&[
        ("LEADFLOW_BACKEND", "memory"),
        ("PASSWORD_RESET_TTL_MINUTES", "15"),
        ("SESSION_TTL_HOURS", "2"),
    ]))
    .unwrap();
    assert_eq!(cfg.password_reset_ttl, time::Duration::minutes(15));
    assert_eq!(cfg.session_ttl, time::Duration::hours(2));
}

#[test]
fn ttls_outside_range_are_rejected() {
    for (key, raw) in [
        ("SESSION_TTL_HOURS", "2000000000"),
        ("SESSION_TTL_HOURS", "0"),
        ("PASSWORD_RESET_TTL_MINUTES", "-5"),
        ("PASSWORD_RESET_TTL_MINUTES", "20000"),
    ] {
        let err = Config::from_lookup(lookup_from(&[("LEADFLOW_BACKEND", "memory"), (key, raw)])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: k, .. } if k == key), "{key}={raw} gave {err:?}");
    }
}

#[test]
fn longest_allowed_session_ttl_still_yields_an_expiry() {
    let cfg = Config::from_lookup(lookup_from(&[
        ("LEADFLOW_BACKEND", "memory"),
        ("SESSION_TTL_HOURS", &MAX_SESSION_TTL_HOURS.to_string()),
    ]))
    .unwrap();
    assert!(time::OffsetDateTime::now_utc().checked_add(cfg.session_ttl).is_some());
}

#[test]
fn parse_bool_variants() {
    for raw in ["1", "true", "YES", " on "] {
        assert_eq!(parse_bool(raw), Some(true), "expected true for {raw:?}");
    }
    for raw in ["0", "false", "No", "off"] {
        assert_eq!(parse_bool(raw), Some(false), "expected false for {raw:?}");
    }
    assert_eq!(parse_bool("maybe"), None);
    assert_eq!(parse_bool(""), None);
}
