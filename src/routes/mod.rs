pub mod push;
pub mod wsroute;
