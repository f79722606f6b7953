mod keepalive;

pub use keepalive::KeepaliveTask;
