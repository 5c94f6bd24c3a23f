/// Keeps the puffin server alive for as long as the engine runs.
pub struct ProfilerServer {
    _server: puffin_http::Server,
}

/// Start the puffin http server on the given port and turn on profiling scopes.
pub fn initialize(port: u16) -> Result<ProfilerServer, anyhow::Error> {
    let address = format!("127.0.0.1:{port}");
    let server = puffin_http::Server::new(&address)?;
    profiling::puffin::set_scopes_on(true);

    log::info!("Puffin profiler listening on {address}");
    Ok(ProfilerServer { _server: server })
}
