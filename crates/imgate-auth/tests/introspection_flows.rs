//! End-to-end authorization flows against a mocked EHR and authorization server.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use imgate_auth::{
    AuthError, AuthorizationAssignment, AuthorizationBackendConfig, AuthorizationRequest,
    DiscoveryConfig, IntrospectionEngine,
};
use p384::SecretKey;
use p384::pkcs8::{EncodePrivateKey, LineEnding};
use rand::rngs::OsRng;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn ec_private_key_pem() -> String {
    SecretKey::random(&mut OsRng)
        .to_pkcs8_pem(LineEnding::LF)
        .unwrap()
        .to_string()
}

fn engine(config: serde_json::Value) -> IntrospectionEngine {
    let config: AuthorizationBackendConfig = serde_json::from_value(config).unwrap();
    IntrospectionEngine::from_config(&config, reqwest::Client::new(), DiscoveryConfig::default())
        .unwrap()
}

fn asymmetric_config(kind: &str, server: &MockServer) -> serde_json::Value {
    json!({
        "type": kind,
        "fhir_base_url": format!("{}/fhir", server.uri()),
        "scope": "system/Patient.read",
        "client": {
            "client_id": "imaging-gateway",
            "alg": "ES384",
            "kid": "key-1",
            "private_key": ec_private_key_pem()
        }
    })
}

async fn mount_discovery(server: &MockServer, with_introspection: bool) {
    let mut document = json!({
        "issuer": server.uri(),
        "token_endpoint": format!("{}/oauth/token", server.uri()),
        "jwks_uri": format!("{}/oauth/jwks", server.uri()),
    });
    if with_introspection {
        document["introspection_endpoint"] = json!(format!("{}/oauth/introspect", server.uri()));
    }
    Mock::given(method("GET"))
        .and(path("/fhir/.well-known/smart-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(document))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_token_endpoint(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains(
            "client_assertion_type=urn%3Aietf%3Aparams%3Aoauth%3Aclient-assertion-type%3Ajwt-bearer",
        ))
        .and(body_string_contains("client_assertion=ey"))
        .and(body_string_contains("scope=system%2FPatient.read"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "backend-token",
            "token_type": "bearer",
            "expires_in": 300
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

async fn mount_introspection(server: &MockServer, response: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/oauth/introspect"))
        .and(header("authorization", "Bearer backend-token"))
        .and(body_string_contains("token=caller-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(response))
        .mount(server)
        .await;
}

fn patient_json(id: &str) -> serde_json::Value {
    json!({
        "resourceType": "Patient",
        "id": id,
        "identifier": [{"type": {"text": "Medical Record Number"}, "value": "MRN-1"}]
    })
}

fn expect_authorized(assignment: AuthorizationAssignment) -> imgate_auth::PatientAuthorization {
    match assignment {
        AuthorizationAssignment::Authorized(grant) => grant,
        AuthorizationAssignment::AccessControlDisabled => panic!("access control unexpectedly off"),
    }
}

#[tokio::test]
async fn standard_flow_authorizes_patient() {
    let server = MockServer::start().await;
    mount_discovery(&server, true).await;
    mount_token_endpoint(&server, 1).await;
    mount_introspection(
        &server,
        json!({"active": true, "scope": "launch patient/ImagingStudy.read", "patient": "123"}),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/fhir/Patient/123"))
        .and(header("authorization", "Bearer backend-token"))
        .and(header("accept", "application/fhir+json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(patient_json("123")))
        .expect(1)
        .mount(&server)
        .await;

    let engine = engine(asymmetric_config("smart-on-fhir", &server));
    let grant = expect_authorized(
        engine
            .assign_authorization(&AuthorizationRequest::bearer("caller-token"))
            .await
            .unwrap(),
    );

    assert_eq!(grant.patient_id(), "123");
    assert_eq!(grant.patient().mrn(), Some("MRN-1"));
    assert_eq!(grant.ehr_base_url(), format!("{}/fhir", server.uri()));
    assert!(grant.introspected().active);
}

#[tokio::test]
async fn discovery_is_reused_but_access_token_is_not() {
    let server = MockServer::start().await;
    mount_discovery(&server, true).await;
    mount_token_endpoint(&server, 2).await;
    mount_introspection(
        &server,
        json!({"active": true, "scope": "patient/*.read", "patient": "123"}),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/fhir/Patient/123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(patient_json("123")))
        .mount(&server)
        .await;

    let engine = engine(asymmetric_config("smart-on-fhir", &server));
    let request = AuthorizationRequest::bearer("caller-token");
    engine.assign_authorization(&request).await.unwrap();
    engine.assign_authorization(&request).await.unwrap();
}

#[tokio::test]
async fn inactive_token_is_always_rejected() {
    let server = MockServer::start().await;
    mount_discovery(&server, true).await;
    mount_token_endpoint(&server, 1).await;
    mount_introspection(
        &server,
        json!({"active": false, "scope": "patient/*.*", "patient": "123"}),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/fhir/Patient/123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(patient_json("123")))
        .expect(0)
        .mount(&server)
        .await;

    let engine = engine(asymmetric_config("smart-on-fhir", &server));
    let err = engine
        .assign_authorization(&AuthorizationRequest::bearer("caller-token"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InactiveToken));
}

#[tokio::test]
async fn token_without_imaging_scope_is_rejected() {
    let server = MockServer::start().await;
    mount_discovery(&server, true).await;
    mount_token_endpoint(&server, 1).await;
    mount_introspection(
        &server,
        json!({"active": true, "scope": "patient/Observation.read", "patient": "123"}),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/fhir/Patient/123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(patient_json("123")))
        .mount(&server)
        .await;

    let engine = engine(asymmetric_config("smart-on-fhir", &server));
    let err = engine
        .assign_authorization(&AuthorizationRequest::bearer("caller-token"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InsufficientScope));
}

#[tokio::test]
async fn missing_patient_is_rejected() {
    let server = MockServer::start().await;
    mount_discovery(&server, true).await;
    mount_token_endpoint(&server, 1).await;
    mount_introspection(
        &server,
        json!({"active": true, "scope": "patient/ImagingStudy.rs", "patient": "gone"}),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/fhir/Patient/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let engine = engine(asymmetric_config("smart-on-fhir", &server));
    let err = engine
        .assign_authorization(&AuthorizationRequest::bearer("caller-token"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::UnresolvedPatient));
}

#[tokio::test]
async fn token_endpoint_failure_is_upstream_error() {
    let server = MockServer::start().await;
    mount_discovery(&server, true).await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "invalid_client"})))
        .mount(&server)
        .await;

    let engine = engine(asymmetric_config("smart-on-fhir", &server));
    let err = engine
        .assign_authorization(&AuthorizationRequest::bearer("caller-token"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::UpstreamToken { .. }));
    assert!(err.is_upstream());
}

#[tokio::test]
async fn epic_derives_introspection_endpoint_and_follows_sub() {
    let server = MockServer::start().await;
    mount_discovery(&server, false).await;
    mount_token_endpoint(&server, 1).await;
    mount_introspection(
        &server,
        json!({
            "active": true,
            "scope": "patient/DiagnosticReport.read",
            "sub": format!("{}/fhir/Patient/e1", server.uri())
        }),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/fhir/Patient/e1"))
        .and(header("authorization", "Bearer backend-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(patient_json("e1")))
        .expect(1)
        .mount(&server)
        .await;

    let engine = engine(asymmetric_config("smart-on-fhir-with-epic-bugfixes", &server));
    assert_eq!(
        engine.introspection_endpoint().await.unwrap(),
        format!("{}/oauth/introspect", server.uri())
    );

    let grant = expect_authorized(
        engine
            .assign_authorization(&AuthorizationRequest::bearer("caller-token"))
            .await
            .unwrap(),
    );
    assert_eq!(grant.patient_id(), "e1");
}

#[tokio::test]
async fn epic_rejects_standard_wildcard_scopes() {
    let server = MockServer::start().await;
    mount_discovery(&server, false).await;
    mount_token_endpoint(&server, 1).await;
    mount_introspection(
        &server,
        json!({
            "active": true,
            "scope": "patient/*.read",
            "sub": format!("{}/fhir/Patient/e1", server.uri())
        }),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/fhir/Patient/e1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(patient_json("e1")))
        .mount(&server)
        .await;

    let engine = engine(asymmetric_config("smart-on-fhir-with-epic-bugfixes", &server));
    let err = engine
        .assign_authorization(&AuthorizationRequest::bearer("caller-token"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InsufficientScope));
}

#[tokio::test]
async fn meditech_uses_basic_auth_and_caller_patient() {
    let server = MockServer::start().await;
    mount_discovery(&server, true).await;
    mount_token_endpoint(&server, 0).await;

    let basic = format!("Basic {}", STANDARD.encode("imaging-gateway:s3cret"));
    Mock::given(method("POST"))
        .and(path("/oauth/introspect"))
        .and(header("authorization", basic.as_str()))
        .and(body_string_contains("token=caller-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "active": true,
            "scope": "patient/ImagingStudy.read",
            "patient": "server-says-someone-else"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fhir/Patient/m7"))
        .and(header("authorization", "Bearer caller-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(patient_json("m7")))
        .expect(1)
        .mount(&server)
        .await;

    let engine = engine(json!({
        "type": "smart-on-fhir-with-meditech-bugfixes",
        "fhir_base_url": format!("{}/fhir", server.uri()),
        "client": {"client_id": "imaging-gateway", "client_secret": "s3cret"}
    }));

    let request = AuthorizationRequest::bearer("caller-token").with_patient_hint("Patient/m7");
    let grant = expect_authorized(engine.assign_authorization(&request).await.unwrap());

    assert_eq!(grant.patient_id(), "m7");
    assert_eq!(grant.introspected().patient.as_deref(), Some("m7"));
}

#[tokio::test]
async fn meditech_without_patient_hint_is_unresolved() {
    let server = MockServer::start().await;
    mount_discovery(&server, true).await;
    Mock::given(method("POST"))
        .and(path("/oauth/introspect"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "active": true,
            "scope": "patient/ImagingStudy.read",
            "patient": "123"
        })))
        .mount(&server)
        .await;

    let engine = engine(json!({
        "type": "smart-on-fhir-with-meditech-bugfixes",
        "fhir_base_url": format!("{}/fhir", server.uri()),
        "client": {"client_id": "imaging-gateway", "client_secret": "s3cret"}
    }));

    let err = engine
        .assign_authorization(&AuthorizationRequest::bearer("caller-token"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::UnresolvedPatient));
}

#[tokio::test]
async fn mock_scenario_authorizes_without_network() {
    let engine = engine(json!({
        "type": "mock",
        "fhir_base_url": "https://ehr.example/fhir",
        "patient": {"resourceType": "Patient", "id": "p1"}
    }));

    let grant = expect_authorized(
        engine
            .assign_authorization(&AuthorizationRequest::default())
            .await
            .unwrap(),
    );
    assert_eq!(grant.patient_id(), "p1");
    assert_eq!(grant.introspected().scope, "patient/ImagingStudy.rs");
}
