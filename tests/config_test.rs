use std::time::Duration;

use case_reconciler::config::Config;
use case_reconciler::config::secrets::ExposeSecret;

const REQUIRED: [&str; 5] = ["BASE_URL", "CLIENT_ID", "CLIENT_SECRET", "API_KEY", "RESOURCE"];

// Environment variables are process-global, so every case runs in one test.
#[test]
fn config_from_env() {
    unsafe {
        std::env::set_var("BASE_URL", "https://momentum.example/api/");
        std::env::set_var("CLIENT_ID", "reconciler");
        std::env::set_var("CLIENT_SECRET", "s3cret");
        std::env::set_var("API_KEY", "key-123");
        std::env::set_var("RESOURCE", "api://momentum");
        std::env::remove_var("TOKEN_URL");
        std::env::remove_var("DATABASE_URL");
        std::env::remove_var("TARGET_GROUP_CODE");
        std::env::remove_var("REQUEST_TIMEOUT_SECS");
    }

    let config = Config::from_env().unwrap();
    assert_eq!(config.case_api.base_url, "https://momentum.example/api");
    assert_eq!(config.case_api.token_url, "https://momentum.example/api/token");
    assert_eq!(config.case_api.client_secret.expose_secret(), "s3cret");
    assert_eq!(config.case_api.request_timeout, Duration::from_secs(30));
    assert_eq!(config.database_url, "sqlite://reconciler.db");
    assert_eq!(config.target_group_code, "6.6");
    assert!(!config.log_level.is_empty());

    // Secrets never show up in debug output.
    let debug = format!("{config:?}");
    assert!(!debug.contains("s3cret"));
    assert!(!debug.contains("key-123"));

    unsafe {
        std::env::set_var("REQUEST_TIMEOUT_SECS", "soon");
    }
    assert!(Config::from_env().is_err());

    unsafe {
        std::env::set_var("REQUEST_TIMEOUT_SECS", "5");
        std::env::set_var("TARGET_GROUP_CODE", "6.7");
    }
    let config = Config::from_env().unwrap();
    assert_eq!(config.case_api.request_timeout, Duration::from_secs(5));
    assert_eq!(config.target_group_code, "6.7");

    for name in REQUIRED {
        unsafe {
            std::env::remove_var(name);
        }
    }
    assert!(Config::from_env().is_err());

    unsafe {
        std::env::remove_var("REQUEST_TIMEOUT_SECS");
        std::env::remove_var("TARGET_GROUP_CODE");
    }
}
