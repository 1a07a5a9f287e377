/// Email Handler Tests Module
///
/// Tests for `/email/unread`, `/email/draft-reply` and `/email/send`
/// against stub userinfo, Gmail and Gemini endpoints.
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use mockito::{Matcher, Mock, Server, ServerGuard};
use pa_agent::config::Endpoints;
use pa_agent::{router, AppState, Config};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const GEMINI_PATH: &str = "/v1beta/models/gemini-2.0-flash:generateContent";
const MESSAGES_PATH: &str = "/gmail/v1/users/me/messages";

fn app(server: &ServerGuard) -> Router {
    let config = Config {
        client_id: Some("test-client-id".to_string()),
        client_secret: Some("test-client-secret".to_string()),
        gemini_api_key: Some("test-gemini-key".to_string()),
        endpoints: Endpoints::local(&server.url()),
        ..Config::default()
    };
    router(Arc::new(AppState::new(config)))
}

fn gemini_reply(text: &str) -> String {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP"
        }]
    })
    .to_string()
}

fn encode(text: &str) -> String {
    base64::encode_config(text.as_bytes(), base64::URL_SAFE)
}

/// A Gmail `format=full` message with a multipart body.
fn gmail_message(id: &str, subject: &str, extra_headers: Value) -> String {
    let mut headers = vec![
        json!({"name": "From", "value": "Sam <sam@example.com>"}),
        json!({"name": "Subject", "value": subject}),
    ];
    if let Value::Array(extra) = extra_headers {
        headers.extend(extra);
    }
    json!({
        "id": id,
        "threadId": format!("thread-{}", id),
        "snippet": "Quick question",
        "payload": {
            "mimeType": "multipart/alternative",
            "headers": headers,
            "parts": [
                {"mimeType": "text/plain", "body": {"data": encode("Can we move the review to Friday?")}},
                {"mimeType": "text/html", "body": {"data": encode("<p>Can we move the review to Friday?</p>")}}
            ]
        }
    })
    .to_string()
}

async fn mock_userinfo(server: &mut ServerGuard) -> Mock {
    server
        .mock("GET", "/oauth2/v2/userinfo")
        .with_status(200)
        .with_body(json!({"email": "me@example.com", "name": "Me"}).to_string())
        .create_async()
        .await
}

fn authed(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, "Bearer ya29.mail-token");
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[cfg(test)]
mod unread_tests {
    use super::*;

    #[tokio::test]
    async fn test_unread_messages_are_summarized() {
        let mut server = Server::new_async().await;
        let _userinfo = mock_userinfo(&mut server).await;
        let list = server
            .mock("GET", MESSAGES_PATH)
            .match_header("authorization", "Bearer ya29.mail-token")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("q".into(), "is:unread".into()),
                Matcher::UrlEncoded("maxResults".into(), "5".into()),
            ]))
            .with_status(200)
            .with_body(
                json!({"messages": [{"id": "m1", "threadId": "t1"}, {"id": "m2", "threadId": "t2"}]})
                    .to_string(),
            )
            .expect(1)
            .create_async()
            .await;
        let _m1 = server
            .mock("GET", "/gmail/v1/users/me/messages/m1")
            .match_query(Matcher::UrlEncoded("format".into(), "full".into()))
            .with_status(200)
            .with_body(gmail_message("m1", "Review", json!([])))
            .create_async()
            .await;
        let _m2 = server
            .mock("GET", "/gmail/v1/users/me/messages/m2")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(gmail_message("m2", "Lunch", json!([])))
            .create_async()
            .await;
        let gemini = server
            .mock("POST", GEMINI_PATH)
            .match_query(Matcher::Any)
            .match_body(Matcher::Regex("move the review to Friday".to_string()))
            .with_status(200)
            .with_body(gemini_reply("Sam wants to move the review."))
            .expect(2)
            .create_async()
            .await;

        let (status, body) = call(&app(&server), authed("GET", "/email/unread", None)).await;
        assert_eq!(status, StatusCode::OK);

        let emails = body["emails"].as_array().unwrap();
        assert_eq!(emails.len(), 2);
        assert_eq!(emails[0]["id"], "m1");
        assert_eq!(emails[0]["sender"], "Sam <sam@example.com>");
        assert_eq!(emails[0]["subject"], "Review");
        assert_eq!(emails[0]["summary"], "Sam wants to move the review.");
        assert_eq!(emails[1]["subject"], "Lunch");
        list.assert_async().await;
        gemini.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_inbox() {
        let mut server = Server::new_async().await;
        let _userinfo = mock_userinfo(&mut server).await;
        let _list = server
            .mock("GET", MESSAGES_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"resultSizeEstimate":0}"#)
            .create_async()
            .await;

        let (status, body) = call(&app(&server), authed("GET", "/email/unread", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["emails"], json!([]));
        assert_eq!(body["message"], "No unread emails found");
    }

    #[tokio::test]
    async fn test_quota_gives_placeholder_summary() {
        let mut server = Server::new_async().await;
        let _userinfo = mock_userinfo(&mut server).await;
        let _list = server
            .mock("GET", MESSAGES_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!({"messages": [{"id": "m1"}]}).to_string())
            .create_async()
            .await;
        let _m1 = server
            .mock("GET", "/gmail/v1/users/me/messages/m1")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(gmail_message("m1", "Review", json!([])))
            .create_async()
            .await;
        let _gemini = server
            .mock("POST", GEMINI_PATH)
            .match_query(Matcher::Any)
            .with_status(429)
            .with_body(r#"{"error":{"code":429,"status":"RESOURCE_EXHAUSTED"}}"#)
            .create_async()
            .await;

        let (status, body) = call(&app(&server), authed("GET", "/email/unread", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["emails"][0]["summary"]
            .as_str()
            .unwrap()
            .contains("try again"));
    }

    #[tokio::test]
    async fn test_gmail_failure_is_gmail_error() {
        let mut server = Server::new_async().await;
        let _userinfo = mock_userinfo(&mut server).await;
        let _list = server
            .mock("GET", MESSAGES_PATH)
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body(r#"{"error":{"code":500,"message":"Backend Error"}}"#)
            .create_async()
            .await;

        let (status, body) = call(&app(&server), authed("GET", "/email/unread", None)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["kind"], "gmail_api_error");
        assert!(body["detail"].as_str().unwrap().contains("Backend Error"));
    }

    #[tokio::test]
    async fn test_unauthenticated_request_never_reaches_gmail() {
        let mut server = Server::new_async().await;
        let _userinfo = server
            .mock("GET", "/oauth2/v2/userinfo")
            .with_status(401)
            .with_body(r#"{"error":{"code":401,"message":"Invalid Credentials"}}"#)
            .create_async()
            .await;
        let list = server
            .mock("GET", MESSAGES_PATH)
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let (status, _) = call(&app(&server), authed("GET", "/email/unread", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        list.assert_async().await;
    }
}

#[cfg(test)]
mod reply_tests {
    use super::*;

    #[tokio::test]
    async fn test_draft_reply_threads_headers() {
        let mut server = Server::new_async().await;
        let _userinfo = mock_userinfo(&mut server).await;
        let _message = server
            .mock("GET", "/gmail/v1/users/me/messages/m1")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(gmail_message(
                "m1",
                "Re: Review",
                json!([
                    {"name": "Message-ID", "value": "<orig@mail.example.com>"},
                    {"name": "References", "value": "<first@mail.example.com>"}
                ]),
            ))
            .create_async()
            .await;
        let gemini = server
            .mock("POST", GEMINI_PATH)
            .match_query(Matcher::Any)
            .match_body(Matcher::Regex("friendly tone".to_string()))
            .with_status(200)
            .with_body(gemini_reply("Hi Sam, Friday works."))
            .expect(1)
            .create_async()
            .await;

        let (status, body) = call(
            &app(&server),
            authed(
                "POST",
                "/email/draft-reply",
                Some(json!({"message_id": "m1", "tone": "friendly"})),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reply"], "Hi Sam, Friday works.");
        assert_eq!(body["subject"], "Re: Review");
        assert_eq!(body["to"], "Sam <sam@example.com>");
        assert_eq!(body["in_reply_to"], "<orig@mail.example.com>");
        assert_eq!(
            body["references"],
            "<first@mail.example.com> <orig@mail.example.com>"
        );
        assert_eq!(body["thread_id"], "thread-m1");
        gemini.assert_async().await;
    }

    #[tokio::test]
    async fn test_draft_reply_defaults_to_professional_tone() {
        let mut server = Server::new_async().await;
        let _userinfo = mock_userinfo(&mut server).await;
        let _message = server
            .mock("GET", "/gmail/v1/users/me/messages/m9")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(gmail_message("m9", "Budget", json!([])))
            .create_async()
            .await;
        let gemini = server
            .mock("POST", GEMINI_PATH)
            .match_query(Matcher::Any)
            .match_body(Matcher::Regex("professional tone".to_string()))
            .with_status(200)
            .with_body(gemini_reply("Dear Sam,"))
            .expect(1)
            .create_async()
            .await;

        let (status, body) = call(
            &app(&server),
            authed("POST", "/email/draft-reply", Some(json!({"message_id": "m9"}))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["subject"], "Re: Budget");
        assert!(body["in_reply_to"].is_null());
        gemini.assert_async().await;
    }
}

#[cfg(test)]
mod send_tests {
    use super::*;

    #[tokio::test]
    async fn test_send_posts_raw_message() {
        let mut server = Server::new_async().await;
        let _userinfo = mock_userinfo(&mut server).await;
        let send = server
            .mock("POST", "/gmail/v1/users/me/messages/send")
            .match_header("authorization", "Bearer ya29.mail-token")
            .match_body(Matcher::AllOf(vec![
                Matcher::PartialJson(json!({"threadId": "thread-m1"})),
                Matcher::Regex(r#""raw":"[A-Za-z0-9_=-]+""#.to_string()),
            ]))
            .with_status(200)
            .with_body(r#"{"id":"sent-1","threadId":"thread-m1","labelIds":["SENT"]}"#)
            .expect(1)
            .create_async()
            .await;

        let (status, body) = call(
            &app(&server),
            authed(
                "POST",
                "/email/send",
                Some(json!({
                    "to": "sam@example.com",
                    "subject": "Re: Review",
                    "body": "Friday works.",
                    "in_reply_to": "<orig@mail.example.com>",
                    "thread_id": "thread-m1"
                })),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message_id"], "sent-1");
        assert_eq!(body["status"], "sent");
        send.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_requires_recipient() {
        let mut server = Server::new_async().await;
        let userinfo = server
            .mock("GET", "/oauth2/v2/userinfo")
            .expect(0)
            .create_async()
            .await;

        let (status, body) = call(
            &app(&server),
            authed(
                "POST",
                "/email/send",
                Some(json!({"to": " ", "subject": "Hi", "body": "Hello"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "bad_request");
        userinfo.assert_async().await;
    }
}
