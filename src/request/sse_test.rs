//! Filters for all the endpoints accessible for Server Sent Event updates
use super::mock_postgres::MockPg;
use super::*;

fn handler() -> Handler {
    let store = MockPg::default()
        .with_token("TEST_USER", 1, 10, "read")
        .with_token("STATUSES_ONLY", 2, 20, "read:statuses")
        .with_list(7, 1);
    Handler::new(Arc::new(store), false)
}

/// Accepted requests reply with an empty 200; rejections go through the error handler
fn rejections(handler: Handler) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    handler
        .sse_subscription()
        .map(|_: Subscription| warp::reply())
        .recover(Handler::err)
}

macro_rules! test_endpoint {
    ($name:ident {
        endpoint: $path:expr,
        $(header: $header:expr,)*
        channels: [$($channel:expr),*],
    }) => {
        #[tokio::test]
        async fn $name() {
            let subscription = warp::test::request()
                .path($path)
                $(.header("authorization", $header))*
                .filter(&handler().sse_subscription())
                .await
                .expect("in test");
            let timeline = subscription.timeline.expect("SSE requests resolve their stream");
            assert_eq!(timeline.channels, vec![$(Channel::new($channel)),*]);
        }
    };
}
macro_rules! test_rejected_endpoint {
    ($name:ident {
        endpoint: $path:expr,
        status: $status:expr,
        error: $error:expr,
    }) => {
        #[tokio::test]
        async fn $name() {
            let res = warp::test::request()
                .path($path)
                .reply(&rejections(handler()))
                .await;
            assert_eq!(res.status(), $status);
            let body: serde_json::Value = serde_json::from_slice(res.body()).expect("json error");
            assert_eq!(body, json!({ "error": $error }));
        }
    };
}

test_endpoint!(public_timeline {
    endpoint: "/api/v1/streaming/public",
    channels: ["timeline:public"],
});
test_endpoint!(public_media_timeline {
    endpoint: "/api/v1/streaming/public?only_media=true",
    channels: ["timeline:public:media"],
});
test_endpoint!(local_timeline {
    endpoint: "/api/v1/streaming/public/local",
    channels: ["timeline:public:local"],
});
test_endpoint!(remote_media_timeline {
    endpoint: "/api/v1/streaming/public/remote?only_media=1",
    channels: ["timeline:public:remote:media"],
});
test_endpoint!(hashtag_timeline {
    endpoint: "/api/v1/streaming/hashtag?tag=Rust",
    channels: ["timeline:hashtag:rust"],
});
test_endpoint!(local_hashtag_timeline {
    endpoint: "/api/v1/streaming/hashtag/local?tag=rust",
    channels: ["timeline:hashtag:rust:local"],
});
test_endpoint!(user_timeline {
    endpoint: "/api/v1/streaming/user?access_token=TEST_USER",
    channels: ["timeline:1", "timeline:1:notifications"],
});
test_endpoint!(user_timeline_with_header_token {
    endpoint: "/api/v1/streaming/user",
    header: "Bearer TEST_USER",
    channels: ["timeline:1", "timeline:1:notifications"],
});
test_endpoint!(header_token_takes_precedence {
    endpoint: "/api/v1/streaming/user?access_token=TEST_USER",
    header: "Bearer STATUSES_ONLY",
    channels: ["timeline:2"],
});
test_endpoint!(user_notification_timeline {
    endpoint: "/api/v1/streaming/user/notification?access_token=TEST_USER",
    channels: ["timeline:1:notifications"],
});
test_endpoint!(direct_timeline {
    endpoint: "/api/v1/streaming/direct?access_token=TEST_USER",
    channels: ["timeline:direct:1"],
});
test_endpoint!(list_timeline {
    endpoint: "/api/v1/streaming/list?access_token=TEST_USER&list=7",
    channels: ["timeline:list:7"],
});

test_rejected_endpoint!(bad_token {
    endpoint: "/api/v1/streaming/public?access_token=INVALID",
    status: StatusCode::UNAUTHORIZED,
    error: "Invalid access token",
});
test_rejected_endpoint!(unowned_list {
    endpoint: "/api/v1/streaming/list?access_token=TEST_USER&list=8",
    status: StatusCode::NOT_FOUND,
    error: "Not authorized to stream this list",
});
test_rejected_endpoint!(missing_scope {
    endpoint: "/api/v1/streaming/user/notification?access_token=STATUSES_ONLY",
    status: StatusCode::NOT_FOUND,
    error: "Access token does not cover required scopes",
});
test_rejected_endpoint!(anonymous_user_timeline {
    endpoint: "/api/v1/streaming/user",
    status: StatusCode::NOT_FOUND,
    error: "Access token does not cover required scopes",
});
test_rejected_endpoint!(missing_hashtag {
    endpoint: "/api/v1/streaming/hashtag",
    status: StatusCode::NOT_FOUND,
    error: "No tag for stream provided",
});

#[tokio::test]
async fn whitelist_mode_rejects_anonymous_requests() {
    let handler = Handler::new(Arc::new(MockPg::default()), true);
    let res = warp::test::request()
        .path("/api/v1/streaming/public")
        .reply(&rejections(handler))
        .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn store_outage_is_service_unavailable() {
    let handler = Handler::new(Arc::new(MockPg::default().failing()), false);
    let res = warp::test::request()
        .path("/api/v1/streaming/public?access_token=TEST_USER")
        .reply(&rejections(handler))
        .await;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn health_check() {
    let res = warp::test::request()
        .path("/api/v1/streaming/health")
        .reply(&handler().health())
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.body(), "OK");
}
