//! Walks one resource through a full response, a revalidation and a
//! malformed `If-Modified-Since`, printing what the host answers.
//!
//! ```sh
//! RUST_LOG=pipewright=debug cargo run --example conditional_get
//! ```

use std::time::{Duration, SystemTime};

use pipewright::cache::{CacheControl, EntityTag};
use pipewright::clock::FixedClock;
use pipewright::host::{Host, HostConfig};
use pipewright::http::Request;
use pipewright::resource::Resource;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let clock = FixedClock::new(SystemTime::now());
    let host = Host::builder()
        .clock(clock.clone())
        .config(HostConfig {
            trace_handlers: true,
            ..HostConfig::default()
        })
        .resource(
            Resource::new("/report", |ctx| {
                Box::pin(async move {
                    ctx.response_mut()
                        .headers_mut()
                        .set("content-type", "application/json");
                    ctx.response_mut().set_body(br#"{"rows":42}"#.to_vec());
                    Ok(())
                })
            })
            .named("DailyReport")
            .last_modified(|ctx| ctx.now() - Duration::from_secs(60))
            .etag(|_| EntityTag::weak("report-42"))
            .cache_control(CacheControl::private().max_age(Duration::from_secs(3600))),
        )
        .build()?;

    println!("chain: {:?}", host.pipeline().factory_names());

    let first = host.handle(Request::get("/report")).await?;
    println!("plain GET           -> {}", first.status().as_u16());
    for (name, value) in first.headers().iter() {
        println!("    {name}: {value}");
    }

    let last_modified = first
        .headers()
        .get("last-modified")
        .unwrap_or_default()
        .to_owned();
    let revalidated = host
        .handle(Request::get("/report").with_header("If-Modified-Since", last_modified))
        .await?;
    println!("If-Modified-Since   -> {}", revalidated.status().as_u16());

    let by_tag = host
        .handle(Request::get("/report").with_header("If-None-Match", "\"report-42\""))
        .await?;
    println!("If-None-Match       -> {}", by_tag.status().as_u16());

    let garbage = host
        .handle(Request::get("/report").with_header("If-Modified-Since", "not-a-date"))
        .await?;
    println!("malformed date      -> {}", garbage.status().as_u16());

    clock.advance(Duration::from_secs(120));
    let later = host.handle(Request::get("/missing")).await?;
    println!("unknown path        -> {}", later.status().as_u16());

    Ok(())
}
