//! End-to-end scenarios driving captured handlers through the full
//! request/result lifecycle: fixture routes, response reflection,
//! diagnostic dumps, link navigation, and the completion/timeout race.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use pretty_assertions::assert_eq;
use simharness::{
    FollowError, FunctionalTest, LinkError, MockResponse, RequestError, RequestOptions,
    RequestResultExt, SectionRenderer, ServerKind,
};

/// Write a response the way the handler's framework would: through the
/// `send` helper when the kind keeps it, otherwise through the raw
/// `write_head`/`end` surface.
fn respond<K: Into<String>, V: Into<String>>(
    res: &MockResponse,
    status: u16,
    headers: impl IntoIterator<Item = (K, V)>,
    body: Option<Bytes>,
) {
    if res.kind().shaping().send_helper {
        res.send::<K, V, Bytes, _>(status, headers, body).expect("send helper available");
    } else {
        res.write_head(status, headers);
        res.end::<Bytes, _>(body);
    }
}

/// `GET /` fixture: responds 200 `this works` as `text/plain`.
fn hello_test(kind: ServerKind) -> FunctionalTest {
    FunctionalTest::with_handler(
        |_req, res, done| {
            respond(
                &res,
                200,
                [("Content-Type", "text/plain")],
                Some(Bytes::from_static(b"this works")),
            );
            done();
        },
        kind,
    )
}

/// `POST /reflect` fixture: streams the request body back and echoes the
/// request headers as response headers.
fn reflect_test(kind: ServerKind) -> FunctionalTest {
    FunctionalTest::with_handler(
        |req, res, _done| {
            let collected = Arc::new(Mutex::new(Vec::<u8>::new()));
            {
                let collected = collected.clone();
                req.on_data(move |chunk| {
                    collected.lock().unwrap().extend_from_slice(chunk);
                });
            }
            let headers = req.headers().clone();
            let collected = collected.clone();
            req.on_end(move || {
                let body = std::mem::take(&mut *collected.lock().unwrap());
                respond(&res, 200, headers.clone(), Some(Bytes::from(body)));
            });
            req.resume();
        },
        kind,
    )
}

/// A two-page fixture: `/` links to `/next` via a `Link` header.
fn linked_test(kind: ServerKind) -> FunctionalTest {
    FunctionalTest::with_handler(
        |req, res, _done| match req.url() {
            "/" => {
                res.set_header("Link", "</next>; rel=next; title=\"Next page\"");
                res.write_head(200, [("Content-Type", "text/plain")]);
                res.end("start");
            }
            "/next" => {
                res.write_head(200, [("Content-Type", "text/plain")]);
                res.end("arrived");
            }
            _ => {
                res.write_head(404, [("Content-Type", "text/plain")]);
                res.end("Not Found");
            }
        },
        kind,
    )
}

const ALL_KINDS: [ServerKind; 4] = [
    ServerKind::Generic,
    ServerKind::Express,
    ServerKind::Restify,
    ServerKind::Restiq,
];

#[test_log::test(tokio::test)]
async fn gets_the_root_route_for_every_server_kind() {
    for kind in ALL_KINDS {
        let result = hello_test(kind)
            .request("GET", "/", RequestOptions::new())
            .await
            .unwrap();

        result
            .assert_status(200)
            .assert_header("Content-Type", "text/plain")
            .assert_body("this works");
    }
}

#[test_log::test(tokio::test)]
async fn reflects_body_and_headers() {
    for kind in ALL_KINDS {
        let result = reflect_test(kind)
            .request(
                "POST",
                "/reflect",
                RequestOptions::new()
                    .with_body("This is my body")
                    .with_header("Content-Type", "anything I like")
                    .with_header(
                        "Asleep",
                        "no, just reflecting on the day, ignore the snoring",
                    ),
            )
            .await
            .unwrap();

        assert_eq!(result.body_str(), Some("This is my body"));
        assert_eq!(result.get_header("content-type"), Some("anything I like"));
        assert_eq!(
            result.get_header("ASLEEP"),
            Some("no, just reflecting on the day, ignore the snoring"),
            "header lookup must be case-insensitive"
        );
    }
}

#[test_log::test(tokio::test)]
async fn defaults_the_host_header_and_content_type() {
    let result = reflect_test(ServerKind::Generic)
        .request(
            "POST",
            "/reflect",
            RequestOptions::new().with_body("hello"),
        )
        .await
        .unwrap();

    // The reflect fixture echoes request headers, so the normalization
    // defaults are observable on the response.
    assert_eq!(result.get_header("host"), Some("localhost"));
    assert_eq!(result.get_header("content-type"), Some("application/json"));
}

#[test_log::test(tokio::test)]
async fn keeps_an_explicit_host_header() {
    let result = reflect_test(ServerKind::Generic)
        .request(
            "POST",
            "/reflect",
            RequestOptions::new().with_header("Host", "example.com"),
        )
        .await
        .unwrap();

    assert_eq!(result.get_header("HOST"), Some("example.com"));
}

#[test_log::test(tokio::test)]
async fn templates_the_uri_and_expands_the_query() {
    let test = FunctionalTest::with_handler(
        |req, res, _done| {
            res.write_head(200, [("Content-Type", "text/plain")]);
            res.end(req.url().to_string());
        },
        ServerKind::Generic,
    );

    let result = test
        .request(
            "GET",
            "/widgets/{id}",
            RequestOptions::new()
                .with_parameter("id", "42")
                .with_query_param("q", "a b"),
        )
        .await
        .unwrap();

    assert_eq!(result.body_str(), Some("/widgets/42?q=a%20b"));
}

#[test_log::test(tokio::test)]
async fn generates_a_string_without_links() {
    let result = hello_test(ServerKind::Restiq)
        .request("GET", "/", RequestOptions::new())
        .await
        .unwrap();

    let rendered = result.render(false);
    let chunks: Vec<&str> = rendered.split("-----").collect();

    assert_eq!(chunks.len(), 5, "unexpected dump: {rendered}");
    assert_eq!(chunks[0], "");
    assert_eq!(chunks[1], format!(" Request #{} ", result.id()));
    assert_eq!(chunks[2], "\nGET /\nHost: localhost\n\n");
    assert_eq!(chunks[3], format!(" Response #{} ", result.id()));
    assert_eq!(chunks[4], "\n200 OK\nContent-Type: text/plain\n\nthis works");
}

#[test_log::test(tokio::test)]
async fn generates_a_string_with_links() {
    let result = reflect_test(ServerKind::Restiq)
        .request(
            "POST",
            "/reflect",
            RequestOptions::new().with_header("Link", "</uri>; rel=x"),
        )
        .await
        .unwrap();

    let rendered = result.render(false);
    let chunks: Vec<&str> = rendered.split("-----").collect();

    assert_eq!(chunks.len(), 7, "unexpected dump: {rendered}");
    assert_eq!(chunks[0], "");
    assert_eq!(chunks[1], format!(" Request #{} ", result.id()));
    assert_eq!(chunks[2], "\nPOST /reflect\nHost: localhost\nLink: </uri>; rel=x\n\n");
    assert_eq!(chunks[3], format!(" Response #{} ", result.id()));
    assert_eq!(
        chunks[4],
        "\n200 OK\nHost: localhost\nLink: </uri>; rel=x\n\n"
    );
    assert_eq!(chunks[5], format!(" Response Links #{} ", result.id()));
    assert_eq!(chunks[6], "\nx: </uri>; rel=x");
}

#[test_log::test(tokio::test)]
async fn colorized_dumps_carry_terminal_codes() {
    colored::control::set_override(true);

    let result = hello_test(ServerKind::Generic)
        .request("GET", "/", RequestOptions::new())
        .await
        .unwrap();

    assert!(result.render(true).contains('\u{1b}'));
    assert!(
        !result.render(false).contains('\u{1b}'),
        "non-colorized output must omit terminal codes"
    );
}

#[test_log::test(tokio::test)]
async fn custom_renderers_append_sections_and_may_omit_them() {
    let mut result = hello_test(ServerKind::Generic)
        .request("GET", "/", RequestOptions::new())
        .await
        .unwrap();

    result.add_renderer(SectionRenderer::new("Timing", |_result, _colorize| {
        Some(vec!["fast enough".to_string()])
    }));
    result.add_renderer(SectionRenderer::new("Absent", |_result, _colorize| None));

    let rendered = result.render(false);
    assert!(rendered.contains(&format!("----- Timing #{} -----\nfast enough", result.id())));
    assert!(!rendered.contains("Absent"), "a None section must be omitted");
}

#[test_log::test(tokio::test)]
async fn finds_a_link_by_relation() {
    let result = reflect_test(ServerKind::Generic)
        .request(
            "POST",
            "/reflect",
            RequestOptions::new().with_header("Link", "</uri>; rel=x"),
        )
        .await
        .unwrap();

    let link = result.find_link("x").unwrap();
    assert_eq!(link.uri, "/uri");
    assert_eq!(link.rel, "x");
}

#[test_log::test(tokio::test)]
async fn link_lookups_fail_loudly() {
    let no_links = hello_test(ServerKind::Generic)
        .request("GET", "/", RequestOptions::new())
        .await
        .unwrap();
    assert_eq!(no_links.find_link("x"), Err(LinkError::NoLinks));

    let linked = reflect_test(ServerKind::Generic)
        .request(
            "POST",
            "/reflect",
            RequestOptions::new()
                .with_header("Link", "</a>; rel=x; title=one, </b>; rel=x; title=two"),
        )
        .await
        .unwrap();

    assert!(
        matches!(linked.find_link("missing"), Err(LinkError::NotFound { .. })),
        "an unknown relation is an error, not an empty result"
    );
    assert!(
        matches!(linked.find_link("x"), Err(LinkError::Ambiguous { .. })),
        "ambiguous lookups are rejected, not resolved by taking the first"
    );
    assert_eq!(linked.find_link_titled("x", "two").unwrap().uri, "/b");
    assert!(matches!(
        linked.find_link_titled("x", "three"),
        Err(LinkError::NotFound { .. })
    ));
}

#[test_log::test(tokio::test)]
async fn follows_a_link_to_the_next_resource() {
    let result = linked_test(ServerKind::Generic)
        .request("GET", "/", RequestOptions::new())
        .await
        .unwrap();

    let followed = result
        .follow("GET", "next", None, RequestOptions::new())
        .await
        .unwrap();
    followed.assert_status(200).assert_body("arrived");

    let titled = result
        .follow("GET", "next", Some("Next page"), RequestOptions::new())
        .await
        .unwrap();
    titled.assert_body("arrived");

    let missing = result
        .follow("GET", "nowhere", None, RequestOptions::new())
        .await;
    assert!(matches!(
        missing,
        Err(FollowError::Link(LinkError::NotFound { .. }))
    ));
}

#[test_log::test(tokio::test)]
async fn rejects_when_the_handler_never_responds() {
    let test = FunctionalTest::with_handler(|_req, _res, _done| {}, ServerKind::Generic);

    let err = test
        .request(
            "GET",
            "/",
            RequestOptions::new().with_timeout(Duration::from_millis(50)),
        )
        .await
        .expect_err("a handler that never ends the response must time out");

    assert!(matches!(
        err,
        RequestError::Timeout { timeout } if timeout == Duration::from_millis(50)
    ));
}

#[test_log::test(tokio::test)]
async fn a_late_response_after_the_timeout_is_harmless() {
    let test = FunctionalTest::with_handler(
        |_req, res, _done| {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                res.end("too late");
            });
        },
        ServerKind::Generic,
    );

    let err = test
        .request(
            "GET",
            "/",
            RequestOptions::new().with_timeout(Duration::from_millis(30)),
        )
        .await
        .expect_err("the timeout must win the race");
    assert!(matches!(err, RequestError::Timeout { .. }));

    // Let the stray end() fire against the dropped exchange.
    tokio::time::sleep(Duration::from_millis(150)).await;
}

#[test_log::test(tokio::test)]
async fn concurrent_requests_are_independent() {
    let test = FunctionalTest::with_handler(
        |req, res, _done| {
            res.write_head(200, [("Content-Type", "text/plain")]);
            res.end(req.url().to_string());
        },
        ServerKind::Generic,
    );

    let (first, second) = tokio::join!(
        test.request("GET", "/a", RequestOptions::new()),
        test.request("GET", "/b", RequestOptions::new()),
    );

    assert_eq!(first.unwrap().body_str(), Some("/a"));
    assert_eq!(second.unwrap().body_str(), Some("/b"));
}

#[test_log::test(tokio::test)]
async fn shaped_out_send_forces_the_manual_header_path() {
    let test = FunctionalTest::with_handler(
        |_req, res, _done| match res.send::<&str, &str, Bytes, _>(
            200,
            [("Content-Type", "text/plain")],
            Some(Bytes::from_static(b"sent")),
        ) {
            Ok(()) => {}
            Err(_) => {
                res.write_head(200, [("Content-Type", "text/plain"), ("X-Fallback", "yes")]);
                res.end("sent manually");
            }
        },
        ServerKind::Restify,
    );

    let result = test.request("GET", "/", RequestOptions::new()).await.unwrap();

    result
        .assert_status(200)
        .assert_header("X-Fallback", "yes")
        .assert_body("sent manually");
}
