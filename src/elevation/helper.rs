//! Helper-side serve loop for the elevated execution channel
//!
//! The `instack-helper` binary runs this loop with elevated privilege. It
//! reads one JSON request per line, applies it through the operation
//! registry and writes one JSON response per line. EOF on input ends the
//! loop.

use std::io::{BufRead, Write};

use crate::elevation::{ElevatedAction, ElevationRequest, ElevationResponse, HANDSHAKE};
use crate::operation::{OperationError, OperationErrorKind, OperationRegistry};

/// Apply a single request through the registry and build the response
pub fn apply_request(
    registry: &OperationRegistry,
    request: &ElevationRequest,
) -> ElevationResponse {
    let mut op = match registry.restore(&request.operation) {
        Ok(op) => op,
        Err(e) => {
            return ElevationResponse {
                success: false,
                error: Some(OperationError {
                    kind: OperationErrorKind::PerformFailed,
                    message: e.to_string(),
                }),
                output: serde_json::Value::Null,
            };
        }
    };

    let success = match request.action {
        ElevatedAction::Perform => op.perform_operation(),
        ElevatedAction::Undo => op.undo_operation(),
    };

    ElevationResponse {
        success,
        error: op.error().cloned(),
        output: op.backup_state(),
    }
}

/// Serve requests until EOF
pub fn serve(
    registry: &OperationRegistry,
    input: impl BufRead,
    mut output: impl Write,
) -> std::io::Result<()> {
    writeln!(output, "{}", HANDSHAKE)?;
    output.flush()?;

    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<ElevationRequest>(&line) {
            Ok(request) => apply_request(registry, &request),
            Err(e) => ElevationResponse {
                success: false,
                error: Some(OperationError {
                    kind: OperationErrorKind::PerformFailed,
                    message: format!("malformed request: {}", e),
                }),
                output: serde_json::Value::Null,
            },
        };

        let encoded = serde_json::to_string(&response)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        writeln!(output, "{}", encoded)?;
        output.flush()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::RecordedOperation;
    use tempfile::TempDir;

    #[test]
    fn test_serve_handshake_then_response() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("made-by-helper");

        let request = ElevationRequest {
            action: ElevatedAction::Perform,
            operation: RecordedOperation {
                kind: "Mkdir".to_string(),
                arguments: vec![target.display().to_string()],
                values: Default::default(),
                elevated: true,
                backup: serde_json::Value::Null,
            },
        };
        let input = format!("{}\n", serde_json::to_string(&request).unwrap());

        let mut output = Vec::new();
        let registry = OperationRegistry::default();
        serve(&registry, input.as_bytes(), &mut output).unwrap();

        let text = String::from_utf8(output).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(HANDSHAKE));

        let response: ElevationResponse =
            serde_json::from_str(lines.next().unwrap()).unwrap();
        assert!(response.success, "{:?}", response.error);
        assert!(target.is_dir());
    }

    #[test]
    fn test_serve_malformed_request() {
        let mut output = Vec::new();
        let registry = OperationRegistry::default();
        serve(&registry, "not json\n".as_bytes(), &mut output).unwrap();

        let text = String::from_utf8(output).unwrap();
        let response: ElevationResponse =
            serde_json::from_str(text.lines().nth(1).unwrap()).unwrap();
        assert!(!response.success);
        assert!(
            response
                .error
                .unwrap()
                .message
                .contains("malformed request")
        );
    }
}
