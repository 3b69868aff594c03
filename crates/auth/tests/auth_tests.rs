//! Sign-in flows, second-factor gate and view guard against a mock backend.

use std::sync::Arc;

use httpmock::prelude::*;
use portal_auth::{
    AuthError, Authenticator, GateState, PlaceholderVerifier, ViewAccess,
};
use portal_backend::BackendClient;
use portal_config::{AuthConfig, BackendConfig};
use portal_session::{
    AccessToken, DisplayName, Identity, Language, MemoryStorage, Profile, Role, Session,
    SessionStore, StaffSession, StudentPin, StudentProfile,
};
use serde_json::{json, Value};

struct Harness {
    server: MockServer,
    store: Arc<SessionStore>,
    auth: Authenticator,
}

impl Harness {
    async fn new() -> Self {
        Self::with_auth_config(AuthConfig::default()).await
    }

    async fn with_auth_config(config: AuthConfig) -> Self {
        let server = MockServer::start_async().await;
        let backend = BackendClient::new(&BackendConfig {
            base_url: server.base_url(),
            anon_key: Some("anon".into()),
            request_timeout_seconds: 5,
        })
        .unwrap();
        let store = Arc::new(
            SessionStore::open(Arc::new(MemoryStorage::default()), Language::English).unwrap(),
        );
        let auth = Authenticator::new(backend, store.clone(), &config);
        Self {
            server,
            store,
            auth,
        }
    }

    fn seed_staff(&self) {
        self.store
            .persist(&Session::Staff(StaffSession {
                identity: Identity {
                    id: "auth-1".into(),
                    email: Some("t@school.test".into()),
                },
                token: AccessToken {
                    access_token: "staff-jwt".into(),
                    refresh_token: None,
                    expires_at: None,
                },
                profile: None,
            }))
            .unwrap();
    }

    fn seed_student(&self) {
        self.store
            .persist(&Session::Student(student_profile()))
            .unwrap();
    }
}

fn student_profile() -> StudentProfile {
    StudentProfile {
        id: "stu-1".into(),
        user_id: None,
        name: DisplayName {
            primary: "Sara Ali".into(),
            arabic: None,
        },
        student_code: "S-100".into(),
        grade_level: Some("10".into()),
        division: Some("A".into()),
    }
}

fn profile_json(role: &str) -> Value {
    json!({
        "id": format!("{role}-profile"),
        "user_id": "auth-1",
        "role": role,
        "full_name": "Someone",
        "student_code": if role == "student" { json!("S-100") } else { Value::Null }
    })
}

fn grant_json() -> Value {
    json!({
        "access_token": "staff-jwt",
        "refresh_token": "refresh",
        "expires_in": 3600,
        "user": { "id": "auth-1", "email": "t@school.test" }
    })
}

#[tokio::test]
async fn invalid_staff_credentials_never_reach_second_factor() {
    let harness = Harness::new().await;
    harness
        .server
        .mock_async(|when, then| {
            when.method(POST).path("/auth/v1/token");
            then.status(400)
                .json_body(json!({ "error_description": "Invalid login credentials" }));
        })
        .await;

    let mut gate = harness.auth.second_factor(Arc::new(PlaceholderVerifier));
    let error = gate
        .submit_credentials("t@school.test", "wrong")
        .await
        .unwrap_err();

    assert!(matches!(error, AuthError::InvalidCredentials));
    assert_eq!(gate.state(), GateState::Credentials);
    assert!(gate.pending_identity().is_none());
    assert!(harness.store.read().unwrap().is_none());
}

#[tokio::test]
async fn staff_sign_in_clears_cached_student_state_first() {
    let harness = Harness::new().await;
    harness.seed_student();
    harness
        .store
        .remember_pin(&StudentPin::new("1234").unwrap())
        .unwrap();
    harness
        .server
        .mock_async(|when, then| {
            when.method(POST).path("/auth/v1/token");
            then.status(400).json_body(json!({ "msg": "nope" }));
        })
        .await;

    let _ = harness.auth.sign_in_staff("t@school.test", "pw").await;

    assert!(harness.store.read().unwrap().is_none());
    assert!(harness.store.cached_pin().unwrap().is_none());
}

#[tokio::test]
async fn blank_credentials_are_rejected_locally() {
    let harness = Harness::new().await;
    let grant = harness
        .server
        .mock_async(|when, then| {
            when.method(POST).path("/auth/v1/token");
            then.status(200).json_body(grant_json());
        })
        .await;
    let verify = harness
        .server
        .mock_async(|when, then| {
            when.method(POST).path("/functions/v1/verify-student-pin");
            then.status(200).json_body(profile_json("student"));
        })
        .await;

    assert!(matches!(
        harness.auth.sign_in_staff("   ", "pw").await,
        Err(AuthError::MissingCredentials)
    ));
    assert!(matches!(
        harness.auth.sign_in_student("S-100", " ").await,
        Err(AuthError::MissingCredentials)
    ));
    assert!(matches!(
        harness.auth.sign_in_staff("t@school.test", " \t ").await,
        Err(AuthError::MissingCredentials)
    ));
    assert_eq!(grant.hits_async().await, 0);
    assert_eq!(verify.hits_async().await, 0);
}

#[tokio::test]
async fn second_factor_flow_persists_session_only_when_authorized() {
    let harness = Harness::new().await;
    harness
        .server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/auth/v1/token")
                .json_body(json!({ "email": "t@school.test", "password": "pw" }));
            then.status(200).json_body(grant_json());
        })
        .await;
    harness
        .server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/functions/v1/get-profiles")
                .header("authorization", "Bearer staff-jwt")
                .json_body(json!({ "user_id": "auth-1" }));
            then.status(200)
                .json_body(json!({ "profiles": [profile_json("teacher")] }));
        })
        .await;

    let mut gate = harness.auth.second_factor(Arc::new(PlaceholderVerifier));
    gate.submit_credentials(" t@school.test ", "pw").await.unwrap();
    assert_eq!(gate.state(), GateState::Totp);
    assert_eq!(gate.pending_identity().unwrap().id, "auth-1");
    assert!(harness.store.read().unwrap().is_none());

    assert!(matches!(
        gate.verify("12345").await,
        Err(AuthError::MalformedSecondFactor)
    ));
    assert!(matches!(
        gate.verify("1234567").await,
        Err(AuthError::MalformedSecondFactor)
    ));
    for padded in [" 123456", "123456 ", "\t123456"] {
        assert!(matches!(
            gate.verify(padded).await,
            Err(AuthError::MalformedSecondFactor)
        ));
        assert_eq!(gate.state(), GateState::Totp);
    }
    assert!(matches!(
        gate.verify("12345a").await,
        Err(AuthError::InvalidSecondFactor)
    ));
    assert_eq!(gate.state(), GateState::Totp);
    assert!(harness.store.read().unwrap().is_none());

    let session = gate.verify("123456").await.unwrap();
    assert_eq!(gate.state(), GateState::Authorized);
    assert_eq!(session.profile.as_ref().map(Profile::role), Some(Role::Teacher));

    match harness.store.read().unwrap() {
        Some(Session::Staff(stored)) => {
            assert_eq!(stored.identity.id, "auth-1");
            assert_eq!(stored.token.bearer(), "staff-jwt");
            assert_eq!(stored.profile.map(|p| p.role()), Some(Role::Teacher));
        }
        other => panic!("expected staff session, got {other:?}"),
    }
}

#[tokio::test]
async fn going_back_discards_pending_sign_in() {
    let harness = Harness::new().await;
    harness
        .server
        .mock_async(|when, then| {
            when.method(POST).path("/auth/v1/token");
            then.status(200).json_body(grant_json());
        })
        .await;

    let mut gate = harness.auth.second_factor(Arc::new(PlaceholderVerifier));
    gate.submit_credentials("t@school.test", "pw").await.unwrap();
    gate.back();

    assert_eq!(gate.state(), GateState::Credentials);
    assert!(gate.pending_identity().is_none());
    assert!(matches!(
        gate.verify("123456").await,
        Err(AuthError::NoPendingSignIn)
    ));
    assert!(harness.store.read().unwrap().is_none());
}

#[tokio::test]
async fn valid_student_code_and_pin_yield_student_session() {
    let harness = Harness::new().await;
    let mock = harness
        .server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/functions/v1/verify-student-pin")
                .json_body(json!({ "student_code": "S-100", "student_pin": "2468" }));
            then.status(200).json_body(profile_json("student"));
        })
        .await;

    let student = harness.auth.sign_in_student(" S-100 ", "2468").await.unwrap();

    mock.assert_async().await;
    assert_eq!(student.student_code, "S-100");
    let session = harness.store.read().unwrap().unwrap();
    assert_eq!(session.profile().map(|p| p.role()), Some(Role::Student));
    assert!(harness.store.cached_pin().unwrap().is_none());
}

#[tokio::test]
async fn password_is_sent_untrimmed() {
    let harness = Harness::new().await;
    let grant = harness
        .server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/auth/v1/token")
                .json_body(json!({ "email": "t@school.test", "password": " pass phrase " }));
            then.status(200).json_body(grant_json());
        })
        .await;

    harness
        .auth
        .sign_in_staff("t@school.test", " pass phrase ")
        .await
        .unwrap();
    grant.assert_async().await;
}

#[tokio::test]
async fn out_of_range_token_lifetime_does_not_abort_sign_in() {
    let harness = Harness::new().await;
    let mut grant = grant_json();
    grant["expires_in"] = json!(i64::MAX);
    harness
        .server
        .mock_async(move |when, then| {
            when.method(POST).path("/auth/v1/token");
            then.status(200).json_body(grant);
        })
        .await;

    let mut gate = harness.auth.second_factor(Arc::new(PlaceholderVerifier));
    gate.submit_credentials("t@school.test", "pw").await.unwrap();
    let session = gate.verify("123456").await.unwrap();

    assert_eq!(session.token.expires_at, None);
    assert_eq!(session.token.bearer(), "staff-jwt");
}

#[tokio::test]
async fn new_student_sign_in_drops_previous_students_pin() {
    let harness = Harness::new().await;
    harness.seed_student();
    harness
        .store
        .remember_pin(&StudentPin::new("1111").unwrap())
        .unwrap();
    let mut other = profile_json("student");
    other["id"] = json!("stu-2");
    other["student_code"] = json!("S-200");
    harness
        .server
        .mock_async(move |when, then| {
            when.method(POST)
                .path("/functions/v1/verify-student-pin")
                .json_body(json!({ "student_code": "S-200", "student_pin": "2222" }));
            then.status(200).json_body(other);
        })
        .await;

    let student = harness.auth.sign_in_student("S-200", "2222").await.unwrap();

    assert_eq!(student.id, "stu-2");
    assert!(harness.store.cached_pin().unwrap().is_none());
    match harness.store.read().unwrap() {
        Some(Session::Student(stored)) => assert_eq!(stored.student_code, "S-200"),
        other => panic!("expected student session, got {other:?}"),
    }
}

#[tokio::test]
async fn failed_student_sign_in_leaves_no_cached_state() {
    let harness = Harness::new().await;
    harness.seed_student();
    harness
        .store
        .remember_pin(&StudentPin::new("1111").unwrap())
        .unwrap();
    harness
        .server
        .mock_async(|when, then| {
            when.method(POST).path("/functions/v1/verify-student-pin");
            then.status(401).json_body(json!({ "error": "Invalid PIN" }));
        })
        .await;

    assert!(matches!(
        harness.auth.sign_in_student("S-300", "9999").await,
        Err(AuthError::InvalidCredentials)
    ));
    assert!(harness.store.read().unwrap().is_none());
    assert!(harness.store.cached_pin().unwrap().is_none());
}

#[tokio::test]
async fn rejected_or_non_student_verification_is_invalid_credentials() {
    let harness = Harness::new().await;
    harness
        .server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/functions/v1/verify-student-pin")
                .json_body_partial(r#"{ "student_pin": "0000" }"#);
            then.status(401).json_body(json!({ "error": "Invalid PIN" }));
        })
        .await;
    harness
        .server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/functions/v1/verify-student-pin")
                .json_body_partial(r#"{ "student_pin": "1111" }"#);
            then.status(200).json_body(profile_json("teacher"));
        })
        .await;

    assert!(matches!(
        harness.auth.sign_in_student("S-100", "0000").await,
        Err(AuthError::InvalidCredentials)
    ));
    assert!(matches!(
        harness.auth.sign_in_student("S-100", "1111").await,
        Err(AuthError::InvalidCredentials)
    ));
    assert!(harness.store.read().unwrap().is_none());
}

#[tokio::test]
async fn student_view_authorizes_from_cache_or_redirects() {
    let harness = Harness::new().await;
    let guard = harness.auth.guard();

    let access = guard.enter(Role::Student).await.unwrap();
    assert_eq!(access.redirect().map(|r| r.path()), Some("/students"));

    harness.seed_student();
    match guard.enter(Role::Student).await.unwrap() {
        ViewAccess::Student(context) => assert_eq!(context.profile().id, "stu-1"),
        other => panic!("expected student context, got {other:?}"),
    }
}

#[tokio::test]
async fn staff_view_with_wrong_role_signs_out_and_redirects() {
    let harness = Harness::new().await;
    harness.seed_staff();
    harness
        .server
        .mock_async(|when, then| {
            when.method(POST).path("/functions/v1/get-profiles");
            then.status(200)
                .json_body(json!({ "profiles": [profile_json("admin")] }));
        })
        .await;
    let logout = harness
        .server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/auth/v1/logout")
                .header("authorization", "Bearer staff-jwt");
            then.status(204);
        })
        .await;

    let access = harness.auth.guard().enter(Role::Teacher).await.unwrap();

    assert_eq!(access.redirect().map(|r| r.path()), Some("/teachers"));
    logout.assert_async().await;
    assert!(harness.store.read().unwrap().is_none());
}

#[tokio::test]
async fn staff_view_redirects_when_lookup_fails_or_finds_nothing() {
    let harness = Harness::new().await;
    harness.seed_staff();
    harness
        .server
        .mock_async(|when, then| {
            when.method(POST).path("/functions/v1/get-profiles");
            then.status(500).body("boom");
        })
        .await;
    harness
        .server
        .mock_async(|when, then| {
            when.method(POST).path("/auth/v1/logout");
            then.status(204);
        })
        .await;

    let access = harness.auth.guard().enter(Role::Admin).await.unwrap();
    assert_eq!(access.redirect().map(|r| r.path()), Some("/administration"));
    assert!(harness.store.read().unwrap().is_none());

    let access = harness.auth.guard().enter(Role::Teacher).await.unwrap();
    assert_eq!(access.redirect().map(|r| r.path()), Some("/teachers"));
}

#[tokio::test]
async fn matching_staff_role_yields_context_and_snapshots_profile() {
    let harness = Harness::new().await;
    harness.seed_staff();
    harness
        .server
        .mock_async(|when, then| {
            when.method(POST).path("/functions/v1/get-profiles");
            then.status(200)
                .json_body(json!({ "profiles": [profile_json("admin"), profile_json("teacher")] }));
        })
        .await;

    match harness.auth.guard().enter(Role::Admin).await.unwrap() {
        ViewAccess::Staff(context) => {
            assert_eq!(context.role(), Role::Admin);
            assert_eq!(context.profile().id, "admin-profile");
            assert_eq!(context.identity_id(), "auth-1");
            assert_eq!(context.bearer(), "staff-jwt");
        }
        other => panic!("expected staff context, got {other:?}"),
    }

    let stored = harness.store.read().unwrap().unwrap();
    assert_eq!(stored.profile().map(|p| p.role()), Some(Role::Admin));
}

#[tokio::test]
async fn memoized_resolver_is_invalidated_on_sign_out() {
    let harness = Harness::with_auth_config(AuthConfig {
        profile_cache_ttl_seconds: 300,
    })
    .await;
    let lookup = harness
        .server
        .mock_async(|when, then| {
            when.method(POST).path("/functions/v1/get-profiles");
            then.status(200)
                .json_body(json!({ "profiles": [profile_json("teacher")] }));
        })
        .await;

    let resolver = harness.auth.resolver();
    assert!(resolver.is_memoized());
    resolver.resolve("auth-1", None).await.unwrap();
    resolver.resolve("auth-1", None).await.unwrap();
    assert_eq!(lookup.hits_async().await, 1);

    harness.auth.sign_out().await.unwrap();
    resolver.resolve("auth-1", None).await.unwrap();
    assert_eq!(lookup.hits_async().await, 2);
}

#[tokio::test]
async fn resolver_without_ttl_always_refetches() {
    let harness = Harness::new().await;
    let lookup = harness
        .server
        .mock_async(|when, then| {
            when.method(POST).path("/functions/v1/get-profiles");
            then.status(200).json_body(json!({ "profiles": [] }));
        })
        .await;

    let resolver = harness.auth.resolver();
    assert!(resolver.resolve("auth-1", None).await.unwrap().is_none());
    assert!(resolver.resolve("auth-1", None).await.unwrap().is_none());
    assert_eq!(lookup.hits_async().await, 2);
}

#[tokio::test]
async fn enveloped_student_verification_is_accepted() {
    let harness = Harness::new().await;
    harness
        .server
        .mock_async(|when, then| {
            when.method(POST).path("/functions/v1/verify-student-pin");
            then.status(200)
                .json_body(json!({ "profiles": [profile_json("student")] }));
        })
        .await;

    let student = harness.auth.sign_in_student("S-100", "2468").await.unwrap();
    assert_eq!(student.id, "student-profile");
}
