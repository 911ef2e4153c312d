//! End-to-end routing scenarios over the public API.

use http::header::{ALLOW, LOCATION};
use http::StatusCode;
use http_body_util::BodyExt;
use trellis_router::{
    empty_body, handler_fn, text_response, BoxBody, BoxHandler, Host, Middleware, Resource,
    Router, RouterError, RouterService,
};
use std::sync::Arc;

fn text_handler(body: &'static str) -> BoxHandler {
    handler_fn(move |mut ctx| async move {
        ctx.set_response(text_response(StatusCode::OK, body));
        (ctx, true)
    })
}

fn path_param_handler(name: &'static str) -> BoxHandler {
    handler_fn(move |mut ctx| async move {
        let value = ctx.path_params().get(name).unwrap_or("").to_string();
        ctx.set_response(text_response(StatusCode::OK, value));
        (ctx, true)
    })
}

fn host_param_handler(name: &'static str) -> BoxHandler {
    handler_fn(move |mut ctx| async move {
        let value = ctx.host_params().get(name).unwrap_or("").to_string();
        ctx.set_response(text_response(StatusCode::OK, value));
        (ctx, true)
    })
}

fn remaining_path_handler() -> BoxHandler {
    handler_fn(|mut ctx| async move {
        let rest = ctx.remaining_path().to_string();
        ctx.set_response(text_response(StatusCode::OK, rest));
        (ctx, true)
    })
}

async fn send(service: &RouterService, method: &str, url: &str) -> hyper::Response<BoxBody> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    let request = hyper::Request::builder()
        .method(method)
        .uri(url)
        .body(empty_body())
        .unwrap();
    service.dispatch(request).await
}

async fn body_string(response: hyper::Response<BoxBody>) -> String {
    let collected = response.into_body().collect().await.unwrap();
    String::from_utf8(collected.to_bytes().to_vec()).unwrap()
}

fn location(response: &hyper::Response<BoxBody>) -> &str {
    response.headers().get(LOCATION).unwrap().to_str().unwrap()
}

#[tokio::test]
async fn static_get_and_trailing_slash_redirect() {
    let mut router = Router::new();
    router
        .resource_mut("/users")
        .unwrap()
        .set_handler_for("GET", text_handler("u"))
        .unwrap();
    let service = router.compile().unwrap();

    let response = send(&service, "GET", "http://x/users").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "u");

    let response = send(&service, "GET", "http://x/users/").await;
    assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);
    assert_eq!(location(&response), "http://x/users");
}

#[tokio::test]
async fn trailing_slash_redirect_appends() {
    let mut router = Router::new();
    router
        .resource_mut("/users/")
        .unwrap()
        .set_handler_for("GET", text_handler("u"))
        .unwrap();
    let service = router.compile().unwrap();

    let response = send(&service, "GET", "http://x/users").await;
    assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);
    assert_eq!(location(&response), "http://x/users/");

    let response = send(&service, "GET", "http://x/users/").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn pattern_capture() {
    let mut router = Router::new();
    router
        .resource_mut("/u/{id:\\d+}")
        .unwrap()
        .set_handler_for("GET", path_param_handler("id"))
        .unwrap();
    let service = router.compile().unwrap();

    let response = send(&service, "GET", "http://x/u/42").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "42");

    let response = send(&service, "GET", "http://x/u/abc").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_string(response).await, "Not Found\n");
}

#[tokio::test]
async fn wildcard_subtree_handler() {
    let mut router = Router::new();
    let files = router.resource_mut("/files").unwrap();
    files.set_subtree_handler();
    files
        .set_handler_for("GET", remaining_path_handler())
        .unwrap();
    let service = router.compile().unwrap();

    let response = send(&service, "GET", "http://x/files/a/b/c").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "a/b/c");

    let response = send(&service, "GET", "http://x/files").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "");
}

#[tokio::test]
async fn subtree_fallback_skips_deeper_registered_branches() {
    let mut router = Router::new();
    let files = router.resource_mut("/files").unwrap();
    files.set_subtree_handler();
    files
        .set_handler_for("GET", remaining_path_handler())
        .unwrap();
    router
        .resource_mut("/files/sub/deep")
        .unwrap()
        .set_handler_for("GET", text_handler("deep"))
        .unwrap();
    let service = router.compile().unwrap();

    // Exact deeper match wins.
    let response = send(&service, "GET", "http://x/files/sub/deep").await;
    assert_eq!(body_string(response).await, "deep");

    // A miss below a registered branch falls back to the subtree
    // handler with the full remaining path.
    let response = send(&service, "GET", "http://x/files/sub/other").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "sub/other");
}

#[tokio::test]
async fn secure_redirect() {
    let mut router = Router::new();
    let secret = router.resource_mut("https:///secret").unwrap();
    secret.set_redirect_insecure();
    secret.set_handler_for("POST", text_handler("s")).unwrap();
    let service = router.compile().unwrap();

    let response = send(&service, "POST", "http://x/secret").await;
    assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);
    assert_eq!(location(&response), "https://x/secret");

    let response = send(&service, "POST", "https://x/secret").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn secure_without_redirect_hides_resource() {
    let mut router = Router::new();
    router
        .resource_mut("https:///vault")
        .unwrap()
        .set_handler_for("GET", text_handler("v"))
        .unwrap();
    let service = router.compile().unwrap();

    let response = send(&service, "GET", "http://x/vault").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(&service, "GET", "https://x/vault").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unclean_path_redirect() {
    let mut router = Router::new();
    router
        .resource_mut("/a")
        .unwrap()
        .set_handler_for("GET", text_handler("a"))
        .unwrap();
    let service = router.compile().unwrap();

    let response = send(&service, "GET", "http://x//./a").await;
    assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);
    assert_eq!(location(&response), "http://x/a");

    let response = send(&service, "GET", "http://x/b/../a").await;
    assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);
    assert_eq!(location(&response), "http://x/a");
}

#[tokio::test]
async fn lenient_on_unclean_path_handles_directly() {
    let mut router = Router::new();
    let a = router.resource_mut("/a").unwrap();
    a.set_lenient_on_unclean_path();
    a.set_handler_for("GET", text_handler("a")).unwrap();
    let service = router.compile().unwrap();

    let response = send(&service, "GET", "http://x//./a").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unclean_and_trailing_slash_merge_into_one_redirect() {
    let mut router = Router::new();
    router
        .resource_mut("/a")
        .unwrap()
        .set_handler_for("GET", text_handler("a"))
        .unwrap();
    let service = router.compile().unwrap();

    let response = send(&service, "GET", "http://x//a/").await;
    assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);
    assert_eq!(location(&response), "http://x/a");
}

#[tokio::test]
async fn strict_trailing_slash_is_not_found() {
    let mut router = Router::new();
    let s = router.resource_mut("/s").unwrap();
    s.set_strict_on_trailing_slash().unwrap();
    s.set_handler_for("GET", text_handler("s")).unwrap();
    let service = router.compile().unwrap();

    let response = send(&service, "GET", "http://x/s/").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(&service, "GET", "http://x/s").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn lenient_trailing_slash_handles_both_forms() {
    let mut router = Router::new();
    let l = router.resource_mut("/l").unwrap();
    l.set_lenient_on_trailing_slash().unwrap();
    l.set_handler_for("GET", text_handler("l")).unwrap();
    let service = router.compile().unwrap();

    assert_eq!(
        send(&service, "GET", "http://x/l").await.status(),
        StatusCode::OK
    );
    assert_eq!(
        send(&service, "GET", "http://x/l/").await.status(),
        StatusCode::OK
    );
}

#[tokio::test]
async fn collision_merge_keeps_handler_capable_node() {
    let mut router = Router::new();
    // Dormant /a/b first, with a child below it.
    router.resource_mut("/a/b/under").unwrap();

    let mut capable = Resource::new("/a/b").unwrap();
    capable.set_handler_for("GET", text_handler("b")).unwrap();
    router.add_resource(capable).unwrap();

    router
        .registered_resource("/a/b/under")
        .unwrap()
        .set_handler_for("GET", text_handler("under"))
        .unwrap();

    // A third handler-capable duplicate must fail.
    let mut third = Resource::new("/a/b").unwrap();
    third.set_handler_for("POST", text_handler("x")).unwrap();
    assert_eq!(
        router.add_resource(third).err(),
        Some(RouterError::DuplicateResourceTemplate("b".to_string()))
    );

    let service = router.compile().unwrap();
    let response = send(&service, "GET", "http://x/a/b").await;
    assert_eq!(body_string(response).await, "b");
    let response = send(&service, "GET", "http://x/a/b/under").await;
    assert_eq!(body_string(response).await, "under");
}

#[tokio::test]
async fn bucket_order_static_then_pattern_then_wildcard() {
    let mut router = Router::new();
    router
        .resource_mut("/users")
        .unwrap()
        .set_handler_for("GET", text_handler("static"))
        .unwrap();
    router
        .resource_mut("/{id:\\d+}")
        .unwrap()
        .set_handler_for("GET", text_handler("pattern"))
        .unwrap();
    router
        .resource_mut("/{rest}")
        .unwrap()
        .set_handler_for("GET", text_handler("wildcard"))
        .unwrap();
    let service = router.compile().unwrap();

    assert_eq!(
        body_string(send(&service, "GET", "http://x/users").await).await,
        "static"
    );
    assert_eq!(
        body_string(send(&service, "GET", "http://x/42").await).await,
        "pattern"
    );
    assert_eq!(
        body_string(send(&service, "GET", "http://x/anything-else").await).await,
        "wildcard"
    );
}

#[tokio::test]
async fn pattern_children_match_in_registration_order() {
    let mut router = Router::new();
    router
        .resource_mut("/{hex:[0-9a-f]+}")
        .unwrap()
        .set_handler_for("GET", text_handler("hex"))
        .unwrap();
    router
        .resource_mut("/{word:[a-z]+}")
        .unwrap()
        .set_handler_for("GET", text_handler("word"))
        .unwrap();
    let service = router.compile().unwrap();

    // "ab" matches both; the first-registered pattern wins.
    assert_eq!(
        body_string(send(&service, "GET", "http://x/ab").await).await,
        "hex"
    );
    assert_eq!(
        body_string(send(&service, "GET", "http://x/xyz").await).await,
        "word"
    );
}

#[tokio::test]
async fn host_selection_static_then_pattern_then_root() {
    let mut router = Router::new();
    router
        .resource_mut("http://example.com/hello")
        .unwrap()
        .set_handler_for("GET", text_handler("static-host"))
        .unwrap();

    let mut sub_root = Resource::new("/").unwrap();
    sub_root
        .subresource_mut("/hello")
        .unwrap()
        .set_handler_for("GET", host_param_handler("sub"))
        .unwrap();
    router
        .add_host(Host::new("{sub:[a-z]+}.example.com", sub_root).unwrap())
        .unwrap();

    router
        .resource_mut("/hello")
        .unwrap()
        .set_handler_for("GET", text_handler("root"))
        .unwrap();
    let service = router.compile().unwrap();

    assert_eq!(
        body_string(send(&service, "GET", "http://example.com/hello").await).await,
        "static-host"
    );
    assert_eq!(
        body_string(send(&service, "GET", "http://api.example.com/hello").await).await,
        "api"
    );
    assert_eq!(
        body_string(send(&service, "GET", "http://other.net/hello").await).await,
        "root"
    );
}

#[tokio::test]
async fn host_matching_is_case_insensitive_and_ignores_port() {
    let mut router = Router::new();
    router
        .resource_mut("http://example.com/a")
        .unwrap()
        .set_handler_for("GET", text_handler("a"))
        .unwrap();
    let service = router.compile().unwrap();

    let response = send(&service, "GET", "http://Example.COM:8080/a").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn method_dispatch_auto_options_and_not_allowed() {
    let mut router = Router::new();
    router
        .resource_mut("/m")
        .unwrap()
        .set_handler_for("GET, POST", text_handler("m"))
        .unwrap();
    let service = router.compile().unwrap();

    let response = send(&service, "OPTIONS", "http://x/m").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(ALLOW).unwrap(),
        "GET, OPTIONS, POST"
    );

    let response = send(&service, "DELETE", "http://x/m").await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(
        response.headers().get(ALLOW).unwrap(),
        "GET, OPTIONS, POST"
    );
}

#[tokio::test]
async fn custom_not_allowed_handler() {
    let mut router = Router::new();
    let m = router.resource_mut("/m").unwrap();
    m.set_handler_for("GET", text_handler("m")).unwrap();
    m.set_handler_for(
        "!",
        handler_fn(|mut ctx| async move {
            let allow = ctx.allowed_methods().unwrap_or("").to_string();
            ctx.set_response(text_response(StatusCode::IM_A_TEAPOT, allow));
            (ctx, true)
        }),
    )
    .unwrap();
    let service = router.compile().unwrap();

    let response = send(&service, "PUT", "http://x/m").await;
    assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
    assert_eq!(body_string(response).await, "GET, OPTIONS");
}

#[tokio::test]
async fn shared_data_reaches_handlers() {
    let mut router = Router::new();
    let r = router.resource_mut("/d").unwrap();
    r.set_shared_data("shared-value".to_string());
    r.set_handler_for(
        "GET",
        handler_fn(|mut ctx| async move {
            let data = ctx
                .shared_data::<String>()
                .map(|d| (*d).clone())
                .unwrap_or_default();
            ctx.set_response(text_response(StatusCode::OK, data));
            (ctx, true)
        }),
    )
    .unwrap();
    let service = router.compile().unwrap();

    let response = send(&service, "GET", "http://x/d").await;
    assert_eq!(body_string(response).await, "shared-value");
}

#[tokio::test]
async fn encoded_slash_stays_inside_segment() {
    let mut router = Router::new();
    router
        .resource_mut("/d/{v:.+}")
        .unwrap()
        .set_handler_for("GET", path_param_handler("v"))
        .unwrap();
    let service = router.compile().unwrap();

    let response = send(&service, "GET", "http://x/d/a%2Fb").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "a/b");
}

#[tokio::test]
async fn root_resource_handles_root_path() {
    let mut router = Router::new();
    router
        .resource_mut("/")
        .unwrap()
        .set_handler_for("GET", text_handler("root"))
        .unwrap();
    let service = router.compile().unwrap();

    let response = send(&service, "GET", "http://x/").await;
    assert_eq!(body_string(response).await, "root");
}

#[tokio::test]
async fn middleware_wraps_in_listed_order() {
    fn tagging(tag: &'static str) -> Arc<dyn Middleware> {
        Arc::new(move |next: BoxHandler| -> BoxHandler {
            Arc::new(move |ctx| {
                let next = next.clone();
                Box::pin(async move {
                    let (mut ctx, handled) = next(ctx).await;
                    if let Some(mut response) = ctx.take_response() {
                        response
                            .headers_mut()
                            .append("x-seen-by", tag.parse().unwrap());
                        ctx.set_response(response);
                    }
                    (ctx, handled)
                }) as trellis_router::HandlerFuture
            })
        })
    }

    let mut router = Router::new();
    let r = router.resource_mut("/w").unwrap();
    r.set_handler_for("GET", text_handler("w")).unwrap();
    r.wrap_request_handler(vec![tagging("inner"), tagging("outer")])
        .unwrap();
    router.wrap_with(vec![tagging("router")]).unwrap();
    let service = router.compile().unwrap();

    let response = send(&service, "GET", "http://x/w").await;
    let tags: Vec<_> = response
        .headers()
        .get_all("x-seen-by")
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    // Unwinding order: innermost wrap appends first, the router-level
    // wrap last.
    assert_eq!(tags, vec!["inner", "outer", "router"]);
}

#[tokio::test]
async fn dormant_trees_do_not_compile() {
    let mut router = Router::new();
    router.resource_mut("/a/b").unwrap();
    assert_eq!(
        router.compile().err(),
        Some(RouterError::DormantResource("/".to_string()))
    );

    let mut router = Router::new();
    router.resource_mut("http://example.com/a").unwrap();
    assert_eq!(
        router.compile().err(),
        Some(RouterError::DormantHost("example.com".to_string()))
    );
}

#[tokio::test]
async fn unknown_path_is_not_found() {
    let mut router = Router::new();
    router
        .resource_mut("/known")
        .unwrap()
        .set_handler_for("GET", text_handler("k"))
        .unwrap();
    let service = router.compile().unwrap();

    let response = send(&service, "GET", "http://x/unknown").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        response.headers().get(http::header::CONTENT_TYPE).unwrap(),
        "text/plain; charset=utf-8"
    );
    assert_eq!(body_string(response).await, "Not Found\n");
}

#[tokio::test]
async fn dormant_exact_match_is_not_found() {
    let mut router = Router::new();
    router
        .resource_mut("/a/b")
        .unwrap()
        .set_handler_for("GET", text_handler("b"))
        .unwrap();
    let service = router.compile().unwrap();

    // "/a" exists but only as a prefix.
    let response = send(&service, "GET", "http://x/a").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
