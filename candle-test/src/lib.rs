mod mock;

pub use mock::{MockConnection, MockError, Reply};
