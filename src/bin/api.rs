use hello_service::{service, ServerResult};

fn main() -> ServerResult<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    service::api().listen(service::API_ADDR)
}
