pub mod lightning;
pub mod logging;
pub mod remote;
pub mod swap;

pub mod proto {
    pub mod v1 {
        tonic::include_proto!("channel_creation.v1");
    }
}
