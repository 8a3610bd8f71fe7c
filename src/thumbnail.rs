use crate::metadata::Thumbnail;

/// Screenshot provider for slot thumbnails. Capture is usually finished by
/// the renderer a frame or more after the request, so results are polled.
pub trait ThumbnailSource: Send {
    fn request(&mut self, width: u32, height: u32);

    /// `Some` once the requested image is ready. Called once per tick.
    fn poll(&mut self) -> Option<Thumbnail>;
}

/// Hands back a fixed image after a set number of polls.
pub struct FixedThumbnail {
    image: Option<Thumbnail>,
    delay: u32,
    requested: Option<(u32, u32)>,
}

impl FixedThumbnail {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            image: Some(Thumbnail {
                width: 0,
                height: 0,
                bytes,
            }),
            delay: 0,
            requested: None,
        }
    }

    /// A source that never produces an image.
    pub fn unavailable() -> Self {
        Self {
            image: None,
            delay: 0,
            requested: None,
        }
    }

    pub fn with_delay(mut self, polls: u32) -> Self {
        self.delay = polls;
        self
    }
}

impl ThumbnailSource for FixedThumbnail {
    fn request(&mut self, width: u32, height: u32) {
        self.requested = Some((width, height));
    }

    fn poll(&mut self) -> Option<Thumbnail> {
        let (width, height) = self.requested?;
        if self.delay > 0 {
            self.delay -= 1;
            return None;
        }
        self.image.take().map(|image| Thumbnail {
            width,
            height,
            ..image
        })
    }
}
