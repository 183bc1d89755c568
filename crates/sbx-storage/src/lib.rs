//! sbx-storage: OpenDAL operators for the strongbox object store

pub mod health;
pub mod operator;

pub use health::{check_health, StorageHealth};
pub use operator::{
    build_from_core_config, build_fs_operator, build_memory_operator, build_s3_operator, S3Config,
};
