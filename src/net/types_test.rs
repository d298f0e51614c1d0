use super::*;

#[test]
fn user_accepts_numeric_id_and_optional_fields() {
    let user: User = serde_json::from_value(serde_json::json!({"id": 12, "username": "ann"})).unwrap();
    assert_eq!(user.id, "12");
    assert_eq!(user.display_name, None);
    assert_eq!(user.label(), "ann");
}

#[test]
fn user_label_prefers_display_name() {
    let user: User =
        serde_json::from_value(serde_json::json!({"id": "u1", "username": "ann", "displayName": "Ann B"})).unwrap();
    assert_eq!(user.label(), "Ann B");
}

#[test]
fn messages_body_accepts_flat_and_wrapped() {
    let msg = serde_json::json!({"id": "m1", "authorName": "a", "body": "b", "createdAt": "2024-01-01T00:00:00Z"});
    let flat: MessagesBody = serde_json::from_value(serde_json::json!([msg.clone()])).unwrap();
    let wrapped: MessagesBody = serde_json::from_value(serde_json::json!({"messages": [msg]})).unwrap();
    assert_eq!(flat.into_messages().len(), 1);
    assert_eq!(wrapped.into_messages()[0].id, "m1");
}

#[test]
fn error_body_summary_prefers_field_errors() {
    let body: ErrorBody = serde_json::from_value(serde_json::json!({
        "message": "bad",
        "errors": [{"path": "username", "msg": "required"}, {"path": "password", "msg": "too short"}]
    }))
    .unwrap();
    assert_eq!(body.summary("x"), "username: required; password: too short");
}

#[test]
fn error_body_summary_falls_back() {
    let body: ErrorBody = serde_json::from_value(serde_json::json!({"error": "wrong password"})).unwrap();
    assert_eq!(body.summary("x"), "wrong password");
    assert_eq!(ErrorBody::default().summary("login failed"), "login failed");
}
