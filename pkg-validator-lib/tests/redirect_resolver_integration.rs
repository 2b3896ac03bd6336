//! Integration tests for redirect resolution against a wiremock server

use core::time::Duration;
use pkg_validator_lib::ValidatorError;
use pkg_validator_lib::redirect::{Redirect, RedirectResolver, RedirectSettings, ResolveRedirects};
use pkg_validator_lib::urls::PackageUrl;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn resolver() -> RedirectResolver {
    let settings = RedirectSettings {
        default_retry_after: Duration::from_millis(10),
        connection_retry_delay: Duration::from_millis(10),
        ..RedirectSettings::default()
    };
    RedirectResolver::new(None, settings).unwrap()
}

fn url(server: &MockServer, p: &str) -> PackageUrl {
    PackageUrl::parse(&format!("{}{p}", server.uri())).unwrap()
}

/// `/foo/hop0` redirects to `/foo/hop1` and so on, until `/foo/hop{hops}` answers 200.
async fn mount_chain(server: &MockServer, hops: u32) {
    for i in 0..hops {
        Mock::given(method("HEAD"))
            .and(path(format!("/foo/hop{i}")))
            .respond_with(ResponseTemplate::new(301).insert_header("location", format!("{}/foo/hop{}", server.uri(), i + 1)))
            .mount(server)
            .await;
    }

    Mock::given(method("HEAD"))
        .and(path(format!("/foo/hop{hops}")))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Miri cannot call CreateIoCompletionPort")]
async fn test_no_redirect() {
    let server = MockServer::start().await;
    mount_chain(&server, 0).await;

    let start = url(&server, "/foo/hop0");
    let redirect = resolver().resolve(&start).await.unwrap();
    assert_eq!(redirect, Redirect::Initial(start));
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Miri cannot call CreateIoCompletionPort")]
async fn test_ten_redirects_are_followed() {
    let server = MockServer::start().await;
    mount_chain(&server, 10).await;

    let redirect = resolver().resolve(&url(&server, "/foo/hop0")).await.unwrap();
    assert_eq!(redirect, Redirect::Redirected(url(&server, "/foo/hop10")));
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Miri cannot call CreateIoCompletionPort")]
async fn test_eleven_redirects_are_too_many() {
    let server = MockServer::start().await;
    mount_chain(&server, 11).await;

    let start = url(&server, "/foo/hop0");
    let err = resolver().resolve(&start).await.unwrap_err();
    match err {
        ValidatorError::MaxRedirectsExceeded(u) => assert_eq!(u, start.as_str()),
        other => panic!("expected MaxRedirectsExceeded, got {other:?}"),
    }
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Miri cannot call CreateIoCompletionPort")]
async fn test_relative_location() {
    let server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path("/foo/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/foo/new"))
        .mount(&server)
        .await;

    Mock::given(method("HEAD"))
        .and(path("/foo/new"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let redirect = resolver().resolve(&url(&server, "/foo/old")).await.unwrap();
    assert_eq!(redirect, Redirect::Redirected(url(&server, "/foo/new")));
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Miri cannot call CreateIoCompletionPort")]
async fn test_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path("/foo/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let start = url(&server, "/foo/gone");
    assert_eq!(resolver().resolve(&start).await.unwrap(), Redirect::NotFound(start));
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Miri cannot call CreateIoCompletionPort")]
async fn test_unauthorized() {
    let server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path("/foo/private"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    assert_eq!(resolver().resolve(&url(&server, "/foo/private")).await.unwrap(), Redirect::Unauthorized);
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Miri cannot call CreateIoCompletionPort")]
async fn test_unexpected_status_is_an_error_outcome() {
    let server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path("/foo/teapot"))
        .respond_with(ResponseTemplate::new(418))
        .mount(&server)
        .await;

    let redirect = resolver().resolve(&url(&server, "/foo/teapot")).await.unwrap();
    assert!(matches!(redirect, Redirect::Error(ref m) if m.contains("418")), "got {redirect:?}");
    assert!(redirect.url().is_none());
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Miri cannot call CreateIoCompletionPort")]
async fn test_rate_limited_then_ok() {
    let server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path("/foo/busy"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("HEAD"))
        .and(path("/foo/busy"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let start = url(&server, "/foo/busy");
    assert_eq!(resolver().resolve(&start).await.unwrap(), Redirect::Initial(start));
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Miri cannot call CreateIoCompletionPort")]
async fn test_server_errors_are_retried() {
    let server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path("/foo/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("HEAD"))
        .and(path("/foo/flaky"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let start = url(&server, "/foo/flaky");
    assert_eq!(resolver().resolve(&start).await.unwrap(), Redirect::Initial(start));
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Miri cannot call CreateIoCompletionPort")]
async fn test_attempt_ceiling() {
    let server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path("/foo/busy"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
        .expect(4)
        .mount(&server)
        .await;

    let settings = RedirectSettings {
        max_redirects: 2,
        max_attempts: 4,
        ..RedirectSettings::default()
    };
    let resolver = RedirectResolver::new(None, settings).unwrap();

    let err = resolver.resolve(&url(&server, "/foo/busy")).await.unwrap_err();
    assert!(matches!(err, ValidatorError::RetryLimitExceeded), "got {err:?}");
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Miri cannot call CreateIoCompletionPort")]
async fn test_package_redirects_handle_git_suffix() {
    let server = MockServer::start().await;

    // Only the suffix-less URL is ever requested
    Mock::given(method("HEAD"))
        .and(path("/foo/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", format!("{}/Foo/New", server.uri())))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("HEAD"))
        .and(path("/Foo/New"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("HEAD"))
        .and(path("/foo/same"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let resolver = resolver();

    let moved = resolver.resolve_package_redirects(&url(&server, "/foo/old.git")).await.unwrap();
    assert_eq!(moved, Redirect::Redirected(url(&server, "/Foo/New.git")));

    let same = url(&server, "/foo/same.git");
    assert_eq!(resolver.resolve_package_redirects(&same).await.unwrap(), Redirect::Initial(same));
}
