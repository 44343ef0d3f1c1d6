use snowflake::SnowflakeIdBucket;
use std::sync::Mutex;

static ID_GENERATOR: Mutex<Option<SnowflakeIdBucket>> = Mutex::new(None);

/// Entities that carry generated identifiers.
///
/// Every id is prefixed with its kind (`alr-7216...`, `act-7216...`),
/// so an identifier in a log line or audit record names what it refers
/// to without further context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    /// Metric sample.
    Sample,
    /// Rule violation finding.
    Finding,
    /// Alert.
    Alert,
    /// Remediation audit record.
    Action,
}

impl IdKind {
    fn prefix(self) -> &'static str {
        match self {
            IdKind::Sample => "smp",
            IdKind::Finding => "fnd",
            IdKind::Alert => "alr",
            IdKind::Action => "act",
        }
    }
}

/// Initialize the snowflake generator backing all id kinds.
///
/// `machine_id`: machine identifier (0-31)
/// `node_id`: node identifier (0-31)
pub fn init(machine_id: i32, node_id: i32) {
    let mut gen = ID_GENERATOR.lock().unwrap();
    *gen = Some(SnowflakeIdBucket::new(machine_id, node_id));
}

/// Generate an id for one entity kind.
pub fn generate(kind: IdKind) -> String {
    let mut gen = ID_GENERATOR.lock().unwrap();
    let bucket = gen.get_or_insert_with(|| SnowflakeIdBucket::new(1, 1));
    format!("{}-{}", kind.prefix(), bucket.get_id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_unique_across_kinds() {
        init(1, 1);
        let mut ids = HashSet::new();
        for _ in 0..500 {
            for kind in [IdKind::Sample, IdKind::Finding, IdKind::Alert, IdKind::Action] {
                let id = generate(kind);
                assert!(ids.insert(id), "duplicate id generated");
            }
        }
    }

    #[test]
    fn id_names_its_kind() {
        init(1, 1);
        let id = generate(IdKind::Alert);
        let (prefix, suffix) = id.split_once('-').expect("prefixed id");
        assert_eq!(prefix, "alr");
        assert!(suffix.parse::<i64>().is_ok(), "numeric suffix: {id}");

        assert!(generate(IdKind::Sample).starts_with("smp-"));
        assert!(generate(IdKind::Finding).starts_with("fnd-"));
        assert!(generate(IdKind::Action).starts_with("act-"));
    }
}
