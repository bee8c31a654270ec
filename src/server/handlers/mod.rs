pub mod health;
pub use self::health::health;

pub mod whoami;
pub use self::whoami::whoami;

pub mod sign_out;
pub use self::sign_out::sign_out;
