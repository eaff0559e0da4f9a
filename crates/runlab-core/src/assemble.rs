//! Wire contract for the execute endpoint and the pure assembly step from
//! an `ExecutionResult` into it.

use serde::{Deserialize, Serialize};

use crate::engine::ExecutionResult;

/// Request body of `POST /api/execute`. `code` is optional at the serde
/// level so a missing field maps to request validation, not a decode error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    #[serde(default)]
    pub code: Option<String>,
}

/// One figure on the wire: its workspace filename and base64 payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FigurePayload {
    pub filename: String,
    pub data: String,
}

/// Response body of `POST /api/execute`, on success and on snippet failure
/// alike; only the payload indicates failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub output: String,
    pub error: String,
    pub figures: Vec<FigurePayload>,
}

impl From<ExecutionResult> for ExecuteResponse {
    fn from(result: ExecutionResult) -> Self {
        Self {
            output: result.stdout_text,
            error: result.stderr_text,
            figures: result
                .figures
                .into_iter()
                .map(|figure| FigurePayload {
                    filename: figure.filename,
                    data: figure.encoded_payload,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plot::CapturedFigure;

    #[test]
    fn assembly_maps_fields_onto_the_wire_contract() {
        let result = ExecutionResult {
            stdout_text: "hi\n".to_string(),
            stderr_text: String::new(),
            figures: vec![CapturedFigure {
                sequence_index: 0,
                filename: "figure_0.png".to_string(),
                image_bytes: vec![1, 2, 3],
                encoded_payload: "AQID".to_string(),
            }],
        };

        let response = ExecuteResponse::from(result);
        assert_eq!(response.output, "hi\n");
        assert_eq!(response.error, "");
        assert_eq!(response.figures.len(), 1);
        assert_eq!(response.figures[0].filename, "figure_0.png");
        assert_eq!(response.figures[0].data, "AQID");
    }

    #[test]
    fn missing_code_field_deserializes_to_none() {
        let request: ExecuteRequest = serde_json::from_str("{}").unwrap();
        assert!(request.code.is_none());

        let request: ExecuteRequest = serde_json::from_str(r#"{"code": "1/0"}"#).unwrap();
        assert_eq!(request.code.as_deref(), Some("1/0"));
    }
}
