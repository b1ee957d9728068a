// "File Viewer" page: enlarged image plus the record's metadata
//
// The image is rendered by the thumbnail queue at VIEW_BOX size; results for
// a record that is no longer shown are dropped by ticket.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::fmt::Display;

use chrono::{Local, TimeZone};
use gdk4::Texture;
use gtk4::prelude::*;
use gtk4::{
    Align, Box as GtkBox, Button, ContentFit, Grid, Label, Orientation, Picture, ScrolledWindow,
    TextView, WrapMode,
};

use crate::models::ImageRecord;
use crate::thumbnails::VIEW_BOX;

/// `asctime`-style layout, e.g. `Thu Jan  1 00:00:00 1970`.
const CREATED_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// Formats a Unix timestamp in `tz`; empty when out of range.
pub fn format_created<Tz>(timestamp: i64, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    tz.timestamp_opt(timestamp, 0)
        .single()
        .map(|t| t.format(CREATED_FORMAT).to_string())
        .unwrap_or_default()
}

/// The Created field for a dictionary timestamp; empty when unparsable.
fn created_text(timestamp: &str) -> String {
    timestamp
        .parse::<i64>()
        .map(|ts| format_created(ts, &Local))
        .unwrap_or_default()
}

pub struct FileViewer {
    root: GtkBox,
    back_button: Button,
    picture: Picture,
    title: TextView,
    description: TextView,
    created: TextView,
    mime_type: TextView,
    ticket: Cell<u64>,
}

impl FileViewer {
    pub fn new() -> Self {
        let root = GtkBox::new(Orientation::Vertical, 8);
        root.add_css_class("file-viewer");
        root.set_margin_top(8);
        root.set_margin_bottom(8);
        root.set_margin_start(8);
        root.set_margin_end(8);

        let back_button = Button::with_label("back");
        back_button.set_halign(Align::Start);
        root.append(&back_button);

        let picture = Picture::new();
        picture.set_can_shrink(true);
        picture.set_content_fit(ContentFit::Contain);
        picture.set_size_request(VIEW_BOX.width as i32, VIEW_BOX.height as i32);
        picture.set_halign(Align::Center);
        picture.add_css_class("viewer-image");
        root.append(&picture);

        let fields = Grid::new();
        fields.set_row_spacing(4);
        fields.set_column_spacing(12);

        let title = Self::attach_field(&fields, 0, "Title");
        let description = Self::attach_field(&fields, 1, "Description");
        let created = Self::attach_field(&fields, 2, "Created");
        let mime_type = Self::attach_field(&fields, 3, "Type");
        root.append(&fields);

        Self {
            root,
            back_button,
            picture,
            title,
            description,
            created,
            mime_type,
            ticket: Cell::new(0),
        }
    }

    fn attach_field(grid: &Grid, row: i32, caption: &str) -> TextView {
        let label = Label::new(Some(caption));
        label.set_halign(Align::End);
        label.set_valign(Align::Start);
        label.add_css_class("viewer-caption");
        grid.attach(&label, 0, row, 1, 1);

        let view = TextView::new();
        view.set_editable(false);
        view.set_cursor_visible(false);
        view.set_wrap_mode(WrapMode::WordChar);
        view.set_hexpand(true);
        view.add_css_class("viewer-field");

        let scroller = ScrolledWindow::new();
        scroller.set_child(Some(&view));
        scroller.set_min_content_height(24);
        scroller.set_hexpand(true);
        grid.attach(&scroller, 1, row, 1, 1);
        view
    }

    pub fn widget(&self) -> &GtkBox {
        &self.root
    }

    pub fn connect_back<F: Fn() + 'static>(&self, callback: F) {
        self.back_button.connect_clicked(move |_| callback());
    }

    /// Fills the page for `record`. The picture stays empty until the result
    /// for `ticket` arrives.
    pub fn show_record(&self, record: &ImageRecord, ticket: u64) {
        self.ticket.set(ticket);
        self.picture.set_paintable(None::<&Texture>);

        let metadata = record.metadata();
        set_text(&self.title, field(&metadata, "title"));
        set_text(&self.description, field(&metadata, "description"));
        set_text(&self.created, &created_text(field(&metadata, "timestamp")));
        set_text(&self.mime_type, field(&metadata, "mime_type"));
    }

    /// Applies a rendered image if it belongs to the record on display.
    pub fn apply_image(&self, ticket: u64, texture: Option<&Texture>) -> bool {
        if ticket == 0 || ticket != self.ticket.get() {
            return false;
        }
        self.picture.set_paintable(texture);
        true
    }

    pub fn clear(&self) {
        self.ticket.set(0);
        self.picture.set_paintable(None::<&Texture>);
    }
}

impl Default for FileViewer {
    fn default() -> Self {
        Self::new()
    }
}

fn field<'a>(metadata: &'a BTreeMap<&'static str, String>, key: &str) -> &'a str {
    metadata.get(key).map(String::as_str).unwrap_or_default()
}

fn set_text(view: &TextView, text: &str) {
    view.buffer().set_text(text);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    #[test]
    fn test_format_created_asctime() {
        assert_eq!(format_created(0, &Utc), "Thu Jan  1 00:00:00 1970");
        assert_eq!(format_created(1_000_000_000, &Utc), "Sun Sep  9 01:46:40 2001");
    }

    #[test]
    fn test_format_created_uses_zone() {
        let east = FixedOffset::east_opt(2 * 3600).unwrap();
        assert_eq!(format_created(0, &east), "Thu Jan  1 02:00:00 1970");
    }

    #[test]
    fn test_format_created_out_of_range() {
        assert_eq!(format_created(i64::MAX, &Utc), "");
    }

    #[test]
    fn test_created_text_from_dictionary_value() {
        assert_eq!(created_text("0"), format_created(0, &Local));
        assert_eq!(created_text(""), "");
        assert_eq!(created_text("soon"), "");
    }
}
