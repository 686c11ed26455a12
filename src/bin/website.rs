use hello_service::{service, ServerResult};

fn main() -> ServerResult<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    service::website().listen(service::WEBSITE_ADDR)
}
