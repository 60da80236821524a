pub mod html;
pub mod ocr_image;
pub mod text;

pub use html::HtmlMenuResolver;
pub use ocr_image::OcrMenuResolver;
