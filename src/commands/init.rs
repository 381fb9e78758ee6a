use anyhow::{Context, Result};
use recrawl::config::{Config, API_KEY_ENV, DEFAULT_CONFIG_FILE};
use std::path::PathBuf;

/// Write a commented default `recrawl.toml` into `path`
pub fn init_config(path: PathBuf, force: bool) -> Result<()> {
    let config = Config::default();
    let config_path = path.join(DEFAULT_CONFIG_FILE);
    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }

    let toml_content = format!(
        r#"# recrawl configuration

[vendor]
base_url = "{base_url}"
# api_key = "..."        # or set {api_key_env}
timeout_secs = {timeout_secs}
max_attempts = {max_attempts}           # per call, including the first
retry_base_delay_ms = {retry_base}
retry_max_delay_ms = {retry_max}
cache_ttl_secs = {cache_ttl}         # source lookups
cache_capacity = {cache_capacity}

[monitor]
poll_interval_secs = {poll}
idle_threshold_secs = {idle}     # no progress for this long = stuck
max_recovery_attempts = {max_recoveries}
min_pages_floor = {min_pages}
min_records_floor = {min_records}
max_concurrent_ticks = {max_ticks}

[campaign]
pages_per_iteration = {ppi}
offset_page_size = {page_size}       # step for offset= style paging
estimate_multiplier = {multiplier}

[storage]
backend = "sled"             # or "memory"
# path = "campaigns.sled"    # defaults to <data_dir>/campaigns.sled

[daemon]
data_dir = ".recrawl"
resume_on_start = true
shutdown_timeout_secs = {shutdown}

[http]
enabled = true
listen_addr = "{listen}"
api_keys = []                # empty = no auth
cors_enabled = false

[logging]
format = "text"              # or "json"
level = "info"
# directives = "tower_http=debug"
"#,
        base_url = config.vendor.base_url,
        api_key_env = API_KEY_ENV,
        timeout_secs = config.vendor.timeout_secs,
        max_attempts = config.vendor.max_attempts,
        retry_base = config.vendor.retry_base_delay_ms,
        retry_max = config.vendor.retry_max_delay_ms,
        cache_ttl = config.vendor.cache_ttl_secs,
        cache_capacity = config.vendor.cache_capacity,
        poll = config.monitor.poll_interval_secs,
        idle = config.monitor.idle_threshold_secs,
        max_recoveries = config.monitor.max_recovery_attempts,
        min_pages = config.monitor.min_pages_floor,
        min_records = config.monitor.min_records_floor,
        max_ticks = config.monitor.max_concurrent_ticks,
        ppi = config.campaign.pages_per_iteration,
        page_size = config.campaign.offset_page_size,
        multiplier = config.campaign.estimate_multiplier,
        shutdown = config.daemon.shutdown_timeout_secs,
        listen = config.http.listen_addr,
    );

    std::fs::create_dir_all(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    std::fs::write(&config_path, toml_content)?;
    println!("Created configuration file: {}", config_path.display());

    let data_dir = path.join(".recrawl");
    std::fs::create_dir_all(&data_dir)?;
    println!("Created data directory: {}", data_dir.display());

    Ok(())
}
