//! MongoDB driver for doclink.
//!
//! This crate implements the `Driver` and `DriverConnection` traits over the official
//! `mongodb` client. Forwarded connection options are appended to the connection string,
//! and every connect is confirmed with a `ping` against the `admin` database.
//!
//! To use this driver, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! doclink = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use doclink::{prelude::*, mongodb::MongoDbDriver};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = ConnectionRegistry::new(MongoDbDriver::new());
//!     let orders = registry
//!         .connect("orders", "localhost", "shop", ConnectOptions::new().user("app").pass("secret"))
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as doclink_mongodb;

pub mod driver;

pub use driver::{MongoDbConnection, MongoDbDriver};
