//! Sharding functions.

use std::hash::Hasher;
use std::str::FromStr;

use fnv::FnvHasher;

/// Maps a sharding key to a shard number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sharding {
    /// FNV-1a hash of the key.
    #[default]
    Hash,
    /// Integer keys modulo the number of shards. Other keys are hashed.
    Modulo,
}

impl Sharding {
    /// Shard number for the key.
    pub fn shard(&self, key: &str, shards: usize) -> usize {
        if shards <= 1 {
            return 0;
        }

        match self {
            Self::Hash => hash(key, shards),
            Self::Modulo => match key.trim().parse::<i64>() {
                Ok(key) => key.rem_euclid(shards as i64) as usize,
                Err(_) => hash(key, shards),
            },
        }
    }
}

fn hash(key: &str, shards: usize) -> usize {
    let mut hasher = FnvHasher::default();
    hasher.write(key.as_bytes());
    (hasher.finish() % shards as u64) as usize
}

impl FromStr for Sharding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hash" => Ok(Self::Hash),
            "modulo" => Ok(Self::Modulo),
            _ => Err(format!("unknown sharding function: {}", s)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_hash_is_stable() {
        let shard = Sharding::Hash.shard("customer_42", 4);
        assert!(shard < 4);
        for _ in 0..10 {
            assert_eq!(Sharding::Hash.shard("customer_42", 4), shard);
        }
    }

    #[test]
    fn test_modulo() {
        assert_eq!(Sharding::Modulo.shard("7", 3), 1);
        assert_eq!(Sharding::Modulo.shard("-1", 3), 2);
        assert_eq!(
            Sharding::Modulo.shard("abc", 3),
            Sharding::Hash.shard("abc", 3)
        );
    }

    #[test]
    fn test_single_shard() {
        assert_eq!(Sharding::Hash.shard("anything", 1), 0);
        assert_eq!(Sharding::Modulo.shard("5", 0), 0);
    }
}
