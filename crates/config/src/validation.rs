//! Cross-field configuration validation
//!
//! Runs after parsing, before the config reaches any component. Single
//! fields with bad types already fail in serde; this pass catches
//! combinations that parse but cannot work.

use crate::node::NodeRole;
use crate::{Config, ConfigError, Result};

pub(crate) fn validate(config: &Config) -> Result<()> {
    let global = &config.global;

    if global.ring_capacity == 0 {
        return Err(invalid("global.ring_capacity must be at least 1"));
    }
    if global.guid_block_size == 0 {
        return Err(invalid("global.guid_block_size must be at least 1"));
    }
    if global.guid_start == 0 {
        return Err(invalid("global.guid_start must be at least 1"));
    }
    if global
        .guid_max
        .saturating_sub(global.guid_start)
        .saturating_add(1)
        < global.guid_block_size
    {
        return Err(invalid(
            "global guid range must be at least one guid block wide",
        ));
    }

    match config.node.role {
        // clients may run detached (no daemon) for offline testing, so
        // upstream stays optional for them
        NodeRole::Client => {}
        NodeRole::Control => {
            if config.node.upstream.is_none() {
                return Err(invalid("node.upstream is required for the control role"));
            }
        }
        NodeRole::Daemon => {
            // daemons may run leaderless in single-node setups; upstream
            // is optional but the listener is not
            if config.node.listen_port == 0 {
                return Err(invalid("node.listen_port is required for the daemon role"));
            }
        }
        NodeRole::Leader => {
            if config.node.listen_port == 0 {
                return Err(invalid("node.listen_port is required for the leader role"));
            }
            if config.node.upstream.is_some() {
                return Err(invalid("node.upstream is not allowed for the leader role"));
            }
        }
    }

    if let Some(upstream) = &config.node.upstream {
        if upstream.host.is_empty() {
            return Err(invalid("node.upstream.host must not be empty"));
        }
        if upstream.port == 0 {
            return Err(invalid("node.upstream.port must not be 0"));
        }
    }

    Ok(())
}

fn invalid(msg: &str) -> ConfigError {
    ConfigError::Validation(msg.into())
}
