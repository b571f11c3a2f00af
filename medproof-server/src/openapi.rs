//! OpenAPI documentation configuration
//!
//! Generates the OpenAPI 3 document served at `/api-docs/openapi.json`.

use utoipa::OpenApi;

use crate::handlers::{
    ComponentHealth, HealthResponse, ReadyResponse, RecordResponse, RegisterResponse,
    VerificationLogResponse, VerifyResponse,
};

/// Medproof Integrity API - OpenAPI Documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Medproof - Integrity API",
        version = "0.1.0",
        description = r#"
## File Integrity Verification & Audit Ledger

Register a file once, prove later that a copy is byte-identical.

1. **Register** a file via `POST /files`. Its SHA-256 fingerprint, storage
   locator and subject are written to an append-only ledger.
2. **Verify** a copy via `POST /files/{id}/verify`. The answer is
   `verified` or `tampered`, and every attempt is logged.
3. Read the **audit trail** via `GET /files/{id}/verifications`.

Callers are identified by the `X-Actor-Identity` and `X-Actor-Role`
headers set by the authenticating gateway.
"#,
        license(name = "MIT OR Apache-2.0")
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server")
    ),
    tags(
        (name = "Registration", description = "Register files on the ledger"),
        (name = "Verification", description = "Compare presented content with a registered record"),
        (name = "Records", description = "Records, content retrieval and audit history"),
        (name = "Health", description = "Service health and readiness endpoints")
    ),
    paths(
        crate::handlers::health::health,
        crate::handlers::health::ready,
        crate::handlers::register::register_handler,
        crate::handlers::verify::verify_handler,
        crate::handlers::records::get_record_handler,
        crate::handlers::records::get_content_handler,
        crate::handlers::records::verification_history_handler,
        crate::handlers::records::invalidate_handler,
        crate::handlers::records::subject_files_handler,
        crate::handlers::records::uploader_files_handler,
    ),
    components(
        schemas(
            ComponentHealth,
            HealthResponse,
            ReadyResponse,
            RecordResponse,
            RegisterResponse,
            VerificationLogResponse,
            VerifyResponse,
        )
    )
)]
pub struct ApiDoc;
