//! Captured frame types

/// Which image of the stereo pair to retrieve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Left,
    Right,
}

/// RGB image of one grabbed frame
#[derive(Debug, Clone)]
pub struct Frame {
    /// RGB pixel data (width * height * 3)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Capture timestamp (microseconds)
    pub timestamp_us: u64,
    /// Frame sequence number
    pub sequence: u64,
    /// Eye this image was taken from
    pub view: View,
}

impl Frame {
    /// Create a frame from raw RGB data
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        timestamp_us: u64,
        sequence: u64,
        view: View,
    ) -> Self {
        Self {
            data,
            width,
            height,
            timestamp_us,
            sequence,
            view,
        }
    }

    /// Get pixel at (x, y)
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y * self.width + x) * 3) as usize;
        self.data
            .get(idx..idx + 3)
            .map(|p| [p[0], p[1], p[2]])
    }

    /// Size of the pixel buffer in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when the frame carries no pixels
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_pixel() {
        let data = vec![
            1, 2, 3, 4, 5, 6, //
            7, 8, 9, 10, 11, 12,
        ];
        let frame = Frame::new(data, 2, 2, 0, 0, View::Left);
        assert_eq!(frame.get_pixel(1, 0), Some([4, 5, 6]));
        assert_eq!(frame.get_pixel(0, 1), Some([7, 8, 9]));
        assert_eq!(frame.get_pixel(2, 0), None);
    }
}
