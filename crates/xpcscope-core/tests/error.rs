//! Tests for error handling

use xpcscope_core::error::{ScopeError, ScopeResult};

#[test]
fn test_setup_error_display()
{
    let error = ScopeError::Setup("_xpc_type_dictionary not exported".to_string());
    let message = format!("{}", error);
    assert!(message.contains("Setup failed"));
    assert!(message.contains("_xpc_type_dictionary"));
}

#[test]
fn test_symbol_not_found_display()
{
    let error = ScopeError::SymbolNotFound {
        module: "libxpc.dylib".to_string(),
        symbol: "xpc_connection_send_message".to_string(),
    };
    let message = format!("{}", error);
    assert_eq!(message, "Symbol xpc_connection_send_message not found in libxpc.dylib");
}

#[test]
fn test_unknown_type_display()
{
    let error = ScopeError::UnknownType("value has no type descriptor".to_string());
    let message = format!("{}", error);
    assert!(message.contains("Structurally invalid"));
    assert!(message.contains("no type descriptor"));
}

#[test]
fn test_invalid_argument_display()
{
    let error = ScopeError::InvalidArgument("test arg".to_string());
    let message = format!("{}", error);
    assert!(message.contains("Invalid argument"));
    assert!(message.contains("test arg"));
}

#[test]
fn test_io_error_conversion()
{
    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let error: ScopeError = io.into();

    match error {
        ScopeError::Io(inner) => assert_eq!(inner.kind(), std::io::ErrorKind::PermissionDenied),
        other => panic!("Expected Io variant, got {other:?}"),
    }
}

#[test]
fn test_json_error_conversion()
{
    let json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let error: ScopeError = json.into();
    assert!(format!("{}", error).starts_with("JSON error"));
}

#[test]
fn test_result_type()
{
    let _result: ScopeResult<()> = Ok(());
    let _error_result: ScopeResult<()> = Err(ScopeError::Transport("receiver dropped".to_string()));
}
