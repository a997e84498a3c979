// noFriction Meetings - Navigation Controller
// Mode-aware keyboard navigation for rewind views
//
// Exactly one keymap is active at a time:
// - List:     j/k and arrows move the selection, Escape clears, '/' focuses search
// - Gallery:  grid cursor with row/page strides, Enter opens the carousel
// - Carousel: Left/Right through the full (unfiltered) gallery ordering
//
// Every key a keymap claims is reported with prevent_default so the page does not
// scroll underneath the view.

use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::config::EngineConfig;
use crate::timeline_index::Stream;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NavMode {
    #[default]
    List,
    Gallery,
    Carousel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Enter,
    Escape,
    Char(char),
}

impl Key {
    /// Parse a DOM `KeyboardEvent.key` value
    pub fn from_dom(name: &str) -> Option<Key> {
        let key = match name {
            "ArrowUp" | "Up" => Key::Up,
            "ArrowDown" | "Down" => Key::Down,
            "ArrowLeft" | "Left" => Key::Left,
            "ArrowRight" | "Right" => Key::Right,
            "Home" => Key::Home,
            "End" => Key::End,
            "PageUp" => Key::PageUp,
            "PageDown" => Key::PageDown,
            "Enter" => Key::Enter,
            "Escape" | "Esc" => Key::Escape,
            other => {
                let mut chars = other.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Key::Char(c),
                    _ => return None,
                }
            }
        };
        Some(key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Back,
    Forward,
}

/// What a claimed key asks the controller to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    SelectNext,
    SelectPrevious,
    ClearSelection,
    FocusSearch,
    CursorStep(Direction),
    CursorRow(Direction),
    CursorPage(Direction),
    CursorFirst,
    CursorLast,
    OpenCarousel,
    ResetGallery,
    CarouselStep(Direction),
    CloseCarousel,
}

/// Stateless keymap: the command `key` maps to in `mode`, if the mode claims it
pub fn dispatch_key(mode: NavMode, key: &Key) -> Option<KeyCommand> {
    use Direction::*;
    use KeyCommand::*;

    match mode {
        NavMode::List => match key {
            Key::Down | Key::Char('j') => Some(SelectNext),
            Key::Up | Key::Char('k') => Some(SelectPrevious),
            Key::Escape => Some(ClearSelection),
            Key::Char('/') => Some(FocusSearch),
            _ => None,
        },
        NavMode::Gallery => match key {
            Key::Left => Some(CursorStep(Back)),
            Key::Right => Some(CursorStep(Forward)),
            Key::Up => Some(CursorRow(Back)),
            Key::Down => Some(CursorRow(Forward)),
            Key::PageUp => Some(CursorPage(Back)),
            Key::PageDown => Some(CursorPage(Forward)),
            Key::Home => Some(CursorFirst),
            Key::End => Some(CursorLast),
            Key::Enter => Some(OpenCarousel),
            Key::Escape => Some(ResetGallery),
            _ => None,
        },
        NavMode::Carousel => match key {
            Key::Left => Some(CarouselStep(Back)),
            Key::Right => Some(CarouselStep(Forward)),
            Key::Escape => Some(CloseCarousel),
            _ => None,
        },
    }
}

/// Result of handling one key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationIntent {
    /// Mode the key was handled in
    pub mode: NavMode,
    pub command: Option<KeyCommand>,
}

impl NavigationIntent {
    /// Whether the view should call `preventDefault()` on the key event
    pub fn prevent_default(&self) -> bool {
        self.command.is_some()
    }
}

/// Keyboard navigation state for one rewind view
#[derive(Debug, Clone)]
pub struct NavigationController {
    mode: NavMode,
    /// Mode to return to when the carousel closes
    carousel_return: NavMode,

    list_len: usize,
    selection: Option<usize>,
    filter_text: String,
    search_focused: bool,
    stream_filter: Option<Stream>,

    /// Filtered gallery position -> index in the full gallery ordering
    gallery: Vec<usize>,
    gallery_total: usize,
    cursor: usize,
    carousel_index: usize,

    row_stride: usize,
    page_stride: usize,
    window: usize,
}

impl NavigationController {
    pub fn new(row_stride: usize, page_stride: usize, window: usize) -> Self {
        Self {
            mode: NavMode::List,
            carousel_return: NavMode::List,
            list_len: 0,
            selection: None,
            filter_text: String::new(),
            search_focused: false,
            stream_filter: None,
            gallery: Vec::new(),
            gallery_total: 0,
            cursor: 0,
            carousel_index: 0,
            row_stride: row_stride.max(1),
            page_stride: page_stride.max(1),
            window: window.max(1),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.gallery_row_stride,
            config.gallery_page_stride,
            config.gallery_window,
        )
    }

    pub fn mode(&self) -> NavMode {
        self.mode
    }

    pub fn selection(&self) -> Option<usize> {
        self.selection
    }

    pub fn select(&mut self, index: Option<usize>) {
        self.selection = index.filter(|&i| i < self.list_len);
    }

    pub fn filter_text(&self) -> &str {
        &self.filter_text
    }

    pub fn set_filter_text(&mut self, text: &str) {
        self.filter_text = text.to_string();
    }

    pub fn is_search_focused(&self) -> bool {
        self.search_focused
    }

    pub fn blur_search(&mut self) {
        self.search_focused = false;
    }

    pub fn stream_filter(&self) -> Option<Stream> {
        self.stream_filter
    }

    /// Filtering to screenshots switches to the gallery grid; anything else is a list
    pub fn set_stream_filter(&mut self, stream: Option<Stream>) {
        self.stream_filter = stream;
        let base = match stream {
            Some(Stream::Screenshot) => NavMode::Gallery,
            _ => NavMode::List,
        };
        if self.mode == NavMode::Carousel {
            self.carousel_return = base;
        } else {
            self.mode = base;
        }
    }

    /// Length of the filtered list; the selection is clamped to it
    pub fn set_list_len(&mut self, len: usize) {
        self.list_len = len;
        self.selection = match self.selection {
            Some(_) if len == 0 => None,
            Some(i) => Some(i.min(len - 1)),
            None => None,
        };
    }

    /// Gallery contents: `filtered[i]` is the full-ordering index of grid cell `i`
    pub fn set_gallery(&mut self, total: usize, filtered: Vec<usize>) {
        self.gallery_total = total;
        self.gallery = filtered.into_iter().filter(|&i| i < total).collect();
        self.cursor = self.cursor.min(self.gallery.len().saturating_sub(1));
        if total == 0 {
            self.carousel_index = 0;
        } else {
            self.carousel_index = self.carousel_index.min(total - 1);
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Full-ordering index under the gallery cursor
    pub fn cursor_target(&self) -> Option<usize> {
        self.gallery.get(self.cursor).copied()
    }

    pub fn carousel_index(&self) -> Option<usize> {
        (self.mode == NavMode::Carousel).then_some(self.carousel_index)
    }

    /// Open the carousel at a full-ordering index (thumbnail click)
    pub fn open_carousel(&mut self, index: usize) -> bool {
        if index >= self.gallery_total {
            return false;
        }
        if self.mode != NavMode::Carousel {
            self.carousel_return = self.mode;
        }
        self.mode = NavMode::Carousel;
        self.carousel_index = index;
        true
    }

    /// Range of grid cells to render around the cursor
    pub fn visible_window(&self) -> Range<usize> {
        let len = self.gallery.len();
        let start = self.cursor.saturating_sub(self.window / 2);
        let end = (start + self.window).min(len);
        end.saturating_sub(self.window)..end
    }

    pub fn handle_key(&mut self, key: Key) -> NavigationIntent {
        let mode = self.mode;

        // Typing into the search field
        if self.search_focused && mode == NavMode::List && key != Key::Escape {
            return NavigationIntent {
                mode,
                command: None,
            };
        }

        let command = dispatch_key(mode, &key);
        if let Some(command) = command {
            self.apply(command);
        }
        NavigationIntent { mode, command }
    }

    fn apply(&mut self, command: KeyCommand) {
        use KeyCommand::*;

        match command {
            SelectNext => {
                if self.list_len > 0 {
                    self.selection = Some(
                        self.selection
                            .map(|i| (i + 1).min(self.list_len - 1))
                            .unwrap_or(0),
                    );
                }
            }
            SelectPrevious => {
                if self.list_len > 0 {
                    self.selection = Some(self.selection.map(|i| i.saturating_sub(1)).unwrap_or(0));
                }
            }
            ClearSelection => {
                self.selection = None;
                self.filter_text.clear();
                self.search_focused = false;
            }
            FocusSearch => self.search_focused = true,
            CursorStep(dir) => self.move_cursor(dir, 1),
            CursorRow(dir) => self.move_cursor(dir, self.row_stride),
            CursorPage(dir) => self.move_cursor(dir, self.page_stride),
            CursorFirst => self.cursor = 0,
            CursorLast => self.cursor = self.gallery.len().saturating_sub(1),
            OpenCarousel => {
                if let Some(target) = self.cursor_target() {
                    self.open_carousel(target);
                }
            }
            ResetGallery => {
                self.cursor = 0;
                self.filter_text.clear();
            }
            CarouselStep(Direction::Back) => {
                self.carousel_index = self.carousel_index.saturating_sub(1);
            }
            CarouselStep(Direction::Forward) => {
                if self.carousel_index + 1 < self.gallery_total {
                    self.carousel_index += 1;
                }
            }
            CloseCarousel => self.mode = self.carousel_return,
        }
    }

    fn move_cursor(&mut self, dir: Direction, by: usize) {
        let last = self.gallery.len().saturating_sub(1);
        self.cursor = match dir {
            Direction::Back => self.cursor.saturating_sub(by),
            Direction::Forward => (self.cursor + by).min(last),
        };
    }
}

impl Default for NavigationController {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}
