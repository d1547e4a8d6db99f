pub mod p02_failure_restores_snapshot;
pub mod p08_update_delete;
pub mod p11_interleaved_write;
