// Main window for the image browser
// GTK4 ApplicationWindow holding a Notebook with one thumbnail grid per source
// tab and a trailing "File Viewer" page.

use gdk4::{Display, Texture};
use gtk4::prelude::*;
use gtk4::{
    Align, Application, ApplicationWindow, Box as GtkBox, CssProvider, Grid, Label,
    Notebook, Orientation, Picture, PolicyType, ScrolledWindow,
    STYLE_PROVIDER_PRIORITY_APPLICATION,
};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Builder as TokioRuntimeBuilder;
use tracing::{debug, warn};

use super::tile::{grid_cell, texture_from_rgba, Tile};
use super::viewer::FileViewer;
use crate::config::BrowserConfig;
use crate::models::{delete_record, ImageRecord, SourceKind};
use crate::scanner::{describe_mounts, list_mounts, SourceLoader};
use crate::thumbnails::queue::{DEFAULT_QUEUE_SIZE, DEFAULT_WORKERS};
use crate::thumbnails::{
    ThumbBox, ThumbnailCache, ThumbnailJob, ThumbnailOutcome, ThumbnailQueue, ThumbnailSource,
    GRID_BOX, VIEW_BOX,
};

const WINDOW_TITLE: &str = "Image Thumbnail";
const VIEWER_TAB_LABEL: &str = "File Viewer";
const DEFAULT_WIDTH: i32 = 1100;
const DEFAULT_HEIGHT: i32 = 860;
const THUMB_POLL_MS: u64 = 16;
const GRID_SPACING: u32 = 12;

const APP_CSS: &str = r#"
window {
    background-color: #1b1b1b;
    color: #e6e6e6;
}

.thumb-tile {
    background-color: #242424;
    border: 1px solid #3a3a3a;
    padding: 6px;
}

.thumb-tile:hover {
    border-color: #5a5a5a;
}

button.btn-danger {
    color: #ff7b72;
}

.viewer-caption {
    font-weight: bold;
}

.viewer-field {
    background-color: #242424;
    padding: 2px 4px;
}

.status-bar {
    padding: 4px 8px;
    font-size: 11px;
    color: #a0a0a0;
}
"#;

fn load_css() {
    let provider = CssProvider::new();
    provider.load_from_string(APP_CSS);

    if let Some(display) = Display::default() {
        gtk4::style_context_add_provider_for_display(
            &display,
            &provider,
            STYLE_PROVIDER_PRIORITY_APPLICATION,
        );
    }
}

/// Result of loading one tab on the background thread.
struct TabLoad {
    index: usize,
    kind: SourceKind,
    result: Result<Vec<ImageRecord>, String>,
}

struct TabState {
    kind: SourceKind,
    page: ScrolledWindow,
    grid: Grid,
    records: Vec<ImageRecord>,
    tiles: Vec<Tile>,
}

/// Where a finished thumbnail goes.
enum ThumbTarget {
    Tile(glib::WeakRef<Picture>),
    Viewer,
}

pub struct MainWindow {
    self_weak: RefCell<Weak<MainWindow>>,
    window: ApplicationWindow,
    notebook: Notebook,
    tabs: RefCell<Vec<TabState>>,
    viewer: FileViewer,
    viewer_page: u32,
    last_tab: Cell<u32>,
    status_label: Label,
    thumbnails: ThumbnailQueue,
    pending: RefCell<HashMap<u64, ThumbTarget>>,
    next_ticket: Cell<u64>,
    config: BrowserConfig,
}

impl MainWindow {
    pub fn new(app: &Application, config: BrowserConfig) -> anyhow::Result<Rc<Self>> {
        load_css();

        let window = ApplicationWindow::builder()
            .application(app)
            .title(WINDOW_TITLE)
            .default_width(DEFAULT_WIDTH)
            .default_height(DEFAULT_HEIGHT)
            .build();

        let mounts = list_mounts();
        let mount_names = describe_mounts(&mounts);
        let loader = Arc::new(SourceLoader::new(config.clone(), mounts));
        let kinds = loader.tab_kinds();

        let notebook = Notebook::new();
        notebook.set_vexpand(true);

        let mut tabs = Vec::with_capacity(kinds.len());
        for kind in &kinds {
            let grid = Grid::new();
            grid.set_row_spacing(GRID_SPACING);
            grid.set_column_spacing(GRID_SPACING);
            grid.set_halign(Align::Center);
            grid.set_margin_top(GRID_SPACING as i32);
            grid.set_margin_bottom(GRID_SPACING as i32);

            let page = ScrolledWindow::new();
            page.set_policy(PolicyType::Never, PolicyType::Automatic);
            page.set_child(Some(&grid));
            let tab_label = Label::new(Some(kind.label()));
            if *kind == SourceKind::External {
                tab_label.set_tooltip_text(Some(&mount_names));
            }
            notebook.append_page(&page, Some(&tab_label));
            // Empty tabs stay hidden
            page.set_visible(false);

            tabs.push(TabState {
                kind: *kind,
                page,
                grid,
                records: Vec::new(),
                tiles: Vec::new(),
            });
        }

        let viewer = FileViewer::new();
        let viewer_page =
            notebook.append_page(viewer.widget(), Some(&Label::new(Some(VIEWER_TAB_LABEL))));
        viewer.widget().set_visible(false);

        let status_label = Label::new(Some("> Loading..."));
        status_label.set_halign(Align::Start);
        status_label.add_css_class("status-bar");

        let root = GtkBox::new(Orientation::Vertical, 0);
        root.append(&notebook);
        root.append(&status_label);
        window.set_child(Some(&root));

        let cache = ThumbnailCache::new(config.thumb_cache_dir.clone(), config.thumb_cache_mb);
        let thumbnails = ThumbnailQueue::new(DEFAULT_WORKERS, DEFAULT_QUEUE_SIZE, cache)?;

        let main_window = Rc::new(Self {
            self_weak: RefCell::new(Weak::new()),
            window,
            notebook,
            tabs: RefCell::new(tabs),
            viewer,
            viewer_page,
            last_tab: Cell::new(0),
            status_label,
            thumbnails,
            pending: RefCell::new(HashMap::new()),
            next_ticket: Cell::new(1),
            config,
        });
        *main_window.self_weak.borrow_mut() = Rc::downgrade(&main_window);

        let weak = Rc::downgrade(&main_window);
        main_window.viewer.connect_back(move || {
            if let Some(window) = weak.upgrade() {
                window.close_viewer();
            }
        });

        let weak = Rc::downgrade(&main_window);
        main_window.window.connect_close_request(move |_| {
            if let Some(window) = weak.upgrade() {
                window.release_thumbnails();
            }
            glib::Propagation::Proceed
        });

        main_window.start_thumbnail_polling();
        main_window.start_loading(loader, kinds);

        Ok(main_window)
    }

    pub fn present(&self) {
        self.window.present();
    }

    pub fn set_status(&self, status: &str) {
        self.status_label.set_text(status);
    }

    /// Loads every tab in order on a helper thread; tabs fill in as their
    /// results reach the main loop.
    fn start_loading(&self, loader: Arc<SourceLoader>, kinds: Vec<SourceKind>) {
        let (tx, rx) = async_channel::unbounded::<TabLoad>();

        std::thread::spawn(move || {
            let runtime = match TokioRuntimeBuilder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    warn!(error = ?e, "Failed to start tab loader runtime");
                    return;
                }
            };

            for (index, kind) in kinds.into_iter().enumerate() {
                let result = runtime
                    .block_on(Arc::clone(&loader).load_async(kind))
                    .map_err(|e| format!("{:#}", e));
                if tx.send_blocking(TabLoad { index, kind, result }).is_err() {
                    break;
                }
            }
        });

        let weak = self.self_weak.borrow().clone();
        glib::spawn_future_local(async move {
            while let Ok(load) = rx.recv().await {
                if let Some(window) = weak.upgrade() {
                    window.apply_tab_load(load);
                } else {
                    break;
                }
            }
        });
    }

    fn apply_tab_load(&self, load: TabLoad) {
        match load.result {
            Ok(records) => {
                self.set_status(&format!("> {}: {} images", load.kind.label(), records.len()));
                self.populate_tab(load.index, records);
            }
            Err(error) => {
                warn!(tab = load.kind.label(), %error, "Failed to load tab");
                self.set_status(&format!("> {}: failed to load", load.kind.label()));
            }
        }
    }

    fn populate_tab(&self, index: usize, records: Vec<ImageRecord>) {
        let mut tabs = self.tabs.borrow_mut();
        let Some(tab) = tabs.get_mut(index) else {
            return;
        };

        for (position, record) in records.iter().enumerate() {
            let tile = Tile::new(tab.kind.allows_delete());
            let (col, row) = grid_cell(position);
            tab.grid.attach(tile.widget(), col, row, 1, 1);

            let id = record.object_id().to_string();
            let weak = self.self_weak.borrow().clone();
            tile.connect_show({
                let weak = weak.clone();
                let id = id.clone();
                move || {
                    if let Some(window) = weak.upgrade() {
                        window.show_record(index, &id);
                    }
                }
            });
            tile.connect_delete(move || {
                if let Some(window) = weak.upgrade() {
                    window.delete_entry(index, &id);
                }
            });

            self.request_thumbnail(
                ThumbnailSource::for_record(record),
                GRID_BOX,
                ThumbTarget::Tile(tile.picture().downgrade()),
            );
            tab.tiles.push(tile);
        }

        tab.records = records;
        tab.page.set_visible(!tab.records.is_empty());
        debug!(tab = tab.kind.label(), count = tab.records.len(), "Populated tab");
    }

    fn request_thumbnail(&self, source: ThumbnailSource, bbox: ThumbBox, target: ThumbTarget) -> u64 {
        if source.is_blank() {
            return 0;
        }
        let ticket = self.next_ticket.get();
        self.next_ticket.set(ticket.wrapping_add(1).max(1));

        let job = ThumbnailJob {
            ticket,
            source,
            bbox,
        };
        // The viewer waits on one image; grid tiles queue behind it
        let queued = match target {
            ThumbTarget::Viewer => self.thumbnails.submit_next(job),
            ThumbTarget::Tile(_) => self.thumbnails.submit(job),
        };
        if !queued {
            return 0;
        }
        self.pending.borrow_mut().insert(ticket, target);
        ticket
    }

    fn release_thumbnails(&self) {
        let cache = self.thumbnails.cache();
        debug!(
            entries = cache.memory_entry_count(),
            bytes = cache.memory_usage(),
            max_bytes = cache.max_memory(),
            "Releasing thumbnail memory"
        );
        cache.clear_memory();
        self.pending.borrow_mut().clear();
    }

    fn start_thumbnail_polling(&self) {
        let weak = self.self_weak.borrow().clone();
        glib::timeout_add_local(Duration::from_millis(THUMB_POLL_MS), move || {
            if let Some(window) = weak.upgrade() {
                window.drain_thumbnails();
                glib::ControlFlow::Continue
            } else {
                glib::ControlFlow::Break
            }
        });
    }

    fn drain_thumbnails(&self) {
        for ready in self.thumbnails.poll_results() {
            let Some(target) = self.pending.borrow_mut().remove(&ready.ticket) else {
                continue;
            };

            let texture: Option<Texture> = match &ready.outcome {
                ThumbnailOutcome::Image(image) => texture_from_rgba(image),
                ThumbnailOutcome::Blank => None,
                ThumbnailOutcome::Failed(error) => {
                    debug!(ticket = ready.ticket, %error, "Thumbnail unavailable");
                    None
                }
            };

            match target {
                ThumbTarget::Tile(picture) => {
                    if let Some(picture) = picture.upgrade() {
                        picture.set_paintable(texture.as_ref());
                    }
                }
                ThumbTarget::Viewer => {
                    self.viewer.apply_image(ready.ticket, texture.as_ref());
                }
            }
        }
    }

    fn find_record(&self, index: usize, id: &str) -> Option<ImageRecord> {
        let tabs = self.tabs.borrow();
        tabs.get(index)?
            .records
            .iter()
            .find(|r| r.object_id() == id)
            .cloned()
    }

    fn show_record(&self, index: usize, id: &str) {
        let Some(record) = self.find_record(index, id) else {
            return;
        };

        if let Some(current) = self.notebook.current_page() {
            if current != self.viewer_page {
                self.last_tab.set(current);
            }
        }

        let ticket = self.request_thumbnail(
            ThumbnailSource::for_viewer(&record),
            VIEW_BOX,
            ThumbTarget::Viewer,
        );
        self.viewer.show_record(&record, ticket);
        self.viewer.widget().set_visible(true);
        self.notebook.set_current_page(Some(self.viewer_page));
        debug!(id, "Showing record");
    }

    fn close_viewer(&self) {
        self.notebook.set_current_page(Some(self.last_tab.get()));
        self.viewer.clear();
        self.viewer.widget().set_visible(false);
    }

    fn delete_entry(&self, index: usize, id: &str) {
        let Some(record) = self.find_record(index, id) else {
            return;
        };

        // Cache keys of files depend on their metadata, so drop them first
        let cache = self.thumbnails.cache();
        cache.remove(&ThumbnailSource::for_record(&record), &[GRID_BOX]);
        cache.remove(&ThumbnailSource::for_viewer(&record), &[VIEW_BOX]);

        if delete_record(&record, &self.config.journal_dir).is_err() {
            self.set_status(&format!("> Cannot delete {}", record.title().unwrap_or(id)));
            return;
        }

        let mut tabs = self.tabs.borrow_mut();
        let Some(tab) = tabs.get_mut(index) else {
            return;
        };
        let Some((position, populated)) = remove_record(&mut tab.records, id) else {
            return;
        };
        let tile = tab.tiles.remove(position);
        tab.grid.remove(tile.widget());

        for (i, tile) in tab.tiles.iter().enumerate().skip(position) {
            let (col, row) = grid_cell(i);
            tab.grid.remove(tile.widget());
            tab.grid.attach(tile.widget(), col, row, 1, 1);
        }

        tab.page.set_visible(populated);
        self.set_status(&format!("> {}: {} images", tab.kind.label(), tab.records.len()));
    }
}

/// Drops the record with `id` from a tab's list. Returns its position and
/// whether the tab still has records to show.
fn remove_record(records: &mut Vec<ImageRecord>, id: &str) -> Option<(usize, bool)> {
    let position = records.iter().position(|r| r.object_id() == id)?;
    records.remove(position);
    Some((position, !records.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileEntry;
    use std::path::PathBuf;

    fn record(path: &str) -> ImageRecord {
        ImageRecord::from_file(FileEntry::new(PathBuf::from(path), "image/png".to_string(), 0))
    }

    #[test]
    fn test_remove_record_reports_emptied_tab() {
        let mut records = vec![record("/home/a.png"), record("/home/b.png")];

        assert_eq!(remove_record(&mut records, "/home/missing.png"), None);
        assert_eq!(records.len(), 2);

        assert_eq!(remove_record(&mut records, "/home/b.png"), Some((1, true)));
        assert_eq!(remove_record(&mut records, "/home/a.png"), Some((0, false)));
        assert!(records.is_empty());
    }
}
