pub mod tile;
pub mod viewer;
pub mod window;

pub use window::MainWindow;
