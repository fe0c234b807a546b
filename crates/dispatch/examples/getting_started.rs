use bytes::Bytes;
use http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use micro_dispatch::filter::accept;
use micro_dispatch::router::{RedirectTarget, UrlOptions};
use micro_dispatch::url::PathArgs;
use micro_dispatch::{App, HandlerType, HandlerTypeBuilder, Router};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

fn timing(builder: HandlerTypeBuilder) -> HandlerTypeBuilder {
    builder.after(|runner| {
        info!(handler = runner.handler_name(), status = ?runner.status(), "handled");
        Ok(())
    })
}

fn build_app() -> Result<App, Box<dyn std::error::Error>> {
    let mut router = Router::builder();
    router
        .request_type("json", accept(mime::APPLICATION_JSON))
        .url("post", "/posts/:id", UrlOptions::default())?
        .get("/posts/:id", [("default", "show_post"), ("json", "show_post_json")])?
        .post("/posts", "create_post")?
        .redirect("/latest", RedirectTarget::dynamic(|runner| runner.url_for("post", PathArgs::new().arg(42)).unwrap_or_default()))?;

    let show_post = HandlerType::from_fn("show_post", |runner| {
        let id = runner.param("id").and_then(|id| id.as_str()).unwrap_or_default().to_string();
        runner.content_type("html", &[])?;
        runner.halt(format!("<h1>post {id}</h1>"))
    });

    let show_post_json = HandlerType::from_fn("show_post_json", |runner| {
        let id = runner.param("id").and_then(|id| id.as_str()).unwrap_or_default().to_string();
        runner.content_type("json", &[])?;
        runner.halt(serde_json::json!({ "id": id }).to_string())
    });

    let create_post = HandlerType::from_fn("create_post", |runner| {
        let title = runner.param("title").and_then(|title| title.as_str()).unwrap_or("untitled").to_string();
        let location = runner.url_for("post", PathArgs::new().arg(1))?;
        runner.redirect(&location, (StatusCode::SEE_OTHER, format!("created {title}")))
    });

    let app = App::builder()
        .router(router.build()?)
        .handlers([show_post.apply(timing).build(), show_post_json.apply(timing).build(), create_post.apply(timing).build()])
        .build()?;
    Ok(app)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let app = build_app()?;

    let requests = vec![
        Request::get("/posts/7").body(Bytes::new())?,
        Request::get("/posts/7").header(http::header::ACCEPT, "application/json").body(Bytes::new())?,
        Request::builder()
            .method(Method::POST)
            .uri("/posts")
            .header(http::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Bytes::from_static(b"title=hello"))?,
        Request::get("/latest").body(Bytes::new())?,
        Request::get("/posts/7/").body(Bytes::new())?,
        Request::get("/nowhere").body(Bytes::new())?,
    ];

    for request in requests {
        let (method, uri) = (request.method().clone(), request.uri().clone());
        let response = app.call(request).await;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await?.to_bytes();
        println!("{method} {uri} -> {status} {headers:?}\n{}\n", String::from_utf8_lossy(&body));
    }

    Ok(())
}
