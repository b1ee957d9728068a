use std::path::Path;

use gtk4::prelude::*;
use gtk4::Application;
use tracing::error;

use crate::config::BrowserConfig;
use crate::ui::MainWindow;

const APP_ID: &str = "org.laptop.ImageThumbnail";

pub struct ImageThumbApp {
    app: Application,
}

impl ImageThumbApp {
    pub fn new(config: BrowserConfig) -> Self {
        let app = Application::builder()
            .application_id(APP_ID)
            .flags(gio::ApplicationFlags::HANDLES_OPEN)
            .build();

        let activate_config = config.clone();
        app.connect_activate(move |app| {
            Self::open_window(app, activate_config.clone());
        });

        app.connect_open(move |app, files, _hint| {
            let config = match files.first().and_then(|f| f.path()) {
                Some(path) => config.clone().with_home_dir(folder_of(&path)),
                None => config.clone(),
            };
            Self::open_window(app, config);
        });

        Self { app }
    }

    pub fn run(&self) -> i32 {
        self.app.run().into()
    }

    fn open_window(app: &Application, config: BrowserConfig) {
        match MainWindow::new(app, config) {
            Ok(window) => {
                window.present();
                // Keep the window alive by storing it on the Application.
                unsafe {
                    app.set_data("main-window", window);
                }
            }
            Err(e) => {
                error!(error = ?e, "Failed to create main window");
                app.quit();
            }
        }
    }
}

/// An opened file stands for the folder containing it.
fn folder_of(path: &Path) -> std::path::PathBuf {
    if path.is_dir() {
        return path.to_path_buf();
    }
    path.parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| path.to_path_buf())
}
