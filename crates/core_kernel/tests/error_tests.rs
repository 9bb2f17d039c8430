//! Tests for core_kernel error types

use core_kernel::error::CoreError;
use core_kernel::money::MoneyError;

#[test]
fn test_core_error_from_money_error() {
    let money_error = MoneyError::InvalidAmount("amount must be positive, got 0".to_string());
    let core_error: CoreError = money_error.into();

    assert!(matches!(core_error, CoreError::Money(_)));
    assert!(core_error.to_string().contains("must be positive"));
}

#[test]
fn test_core_error_configuration() {
    let error = CoreError::configuration("stale threshold must exceed remote timeout");

    match error {
        CoreError::Configuration(msg) => assert!(msg.contains("stale threshold")),
        _ => panic!("Expected Configuration error"),
    }
    assert!(CoreError::configuration("sweep_interval_secs must be positive")
        .to_string()
        .starts_with("Configuration error"));
}
