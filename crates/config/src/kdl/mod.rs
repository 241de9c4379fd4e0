//! KDL configuration parsing.

mod helpers;
mod sections;

pub use helpers::{get_child, get_first_arg, get_first_arg_string, get_int_entry, get_string_entry};
pub use sections::{parse_certificates_config, parse_key_config, parse_storage_config};

use kdl::KdlDocument;
use tracing::trace;

use crate::{Config, ConfigError};

/// Build a [`Config`] from a parsed KDL document
pub fn parse_document(document: &KdlDocument) -> Result<Config, ConfigError> {
    let mut config = Config::default();

    for node in document.nodes() {
        match node.name().value() {
            "storage" => config.storage = parse_storage_config(node)?,
            "keys" => config.keys = parse_key_config(node)?,
            "certificates" => config.certificates = parse_certificates_config(node)?,
            other => return Err(ConfigError::UnknownBlock(other.to_string())),
        }
    }

    trace!("Finished parsing configuration document");
    Ok(config)
}
