pub mod action;
pub mod config;
pub mod gateway;
pub mod rpc;
