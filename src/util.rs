use uuid::Uuid;

/// Generate a prefixed unique id for nodes, sockets, headers and connections,
/// e.g. `param_1f3c…`.
pub fn generate_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id_has_prefix() {
        let id = generate_id("conn");
        assert!(id.starts_with("conn_"));
    }

    #[test]
    fn test_generate_id_unique() {
        assert_ne!(generate_id("node"), generate_id("node"));
    }
}
