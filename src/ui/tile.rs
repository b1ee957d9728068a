// Grid tile: thumbnail picture with "Show File" and optional "Delete" buttons

use gdk4::{MemoryFormat, MemoryTexture, Texture};
use gtk4::prelude::*;
use gtk4::{Align, Box as GtkBox, Button, ContentFit, Orientation, Picture};
use image::RgbaImage;

use crate::thumbnails::GRID_BOX;

/// Tiles per grid row.
pub const TILES_PER_ROW: u32 = 3;

/// Wraps decoded RGBA pixels in a GDK texture.
pub fn texture_from_rgba(image: &RgbaImage) -> Option<Texture> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return None;
    }
    let bytes = glib::Bytes::from_owned(image.as_raw().clone());
    let texture = MemoryTexture::new(
        width as i32,
        height as i32,
        MemoryFormat::R8g8b8a8,
        &bytes,
        (width * 4) as usize,
    );
    Some(texture.upcast())
}

/// Grid position of the `index`-th tile.
pub fn grid_cell(index: usize) -> (i32, i32) {
    let per_row = TILES_PER_ROW as usize;
    ((index % per_row) as i32, (index / per_row) as i32)
}

pub struct Tile {
    root: GtkBox,
    picture: Picture,
    show_button: Button,
    delete_button: Option<Button>,
}

impl Tile {
    pub fn new(deletable: bool) -> Self {
        let root = GtkBox::new(Orientation::Vertical, 4);
        root.add_css_class("thumb-tile");

        let picture = Picture::new();
        picture.set_can_shrink(true);
        picture.set_content_fit(ContentFit::Contain);
        picture.set_size_request(GRID_BOX.width as i32, GRID_BOX.height as i32);
        picture.set_halign(Align::Center);
        picture.set_valign(Align::Center);
        picture.add_css_class("thumb-image");
        root.append(&picture);

        let buttons = GtkBox::new(Orientation::Horizontal, 4);
        buttons.set_halign(Align::Center);

        let show_button = Button::with_label("Show File");
        buttons.append(&show_button);

        let delete_button = deletable.then(|| {
            let button = Button::with_label("Delete");
            button.add_css_class("btn-danger");
            buttons.append(&button);
            button
        });

        root.append(&buttons);

        Self {
            root,
            picture,
            show_button,
            delete_button,
        }
    }

    pub fn widget(&self) -> &GtkBox {
        &self.root
    }

    pub fn picture(&self) -> &Picture {
        &self.picture
    }

    pub fn connect_show<F: Fn() + 'static>(&self, callback: F) {
        self.show_button.connect_clicked(move |_| callback());
    }

    pub fn connect_delete<F: Fn() + 'static>(&self, callback: F) {
        if let Some(button) = &self.delete_button {
            button.connect_clicked(move |_| callback());
        }
    }
}
