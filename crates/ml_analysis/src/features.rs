use common_creatives::DetectedObject;

/// Product categories the topic classifier can predict.
pub const TOPICS: [&str; 5] = ["tableware", "ties", "bags", "cups", "clocks"];

/// Class vocabulary of the object detector (COCO order). The classifier's
/// object-feature vector is indexed by this list.
pub const DETECTOR_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

/// Normalizes OCR text for the classifier: lowercase, alphanumerics only,
/// single spaces.
#[must_use]
pub fn clean_text(text: &str) -> String {
    let lowered = text.to_lowercase();
    let mut cleaned = String::with_capacity(lowered.len());
    let mut last_was_space = true;
    for c in lowered.chars() {
        if c.is_alphanumeric() {
            cleaned.push(c);
            last_was_space = false;
        } else if !last_was_space {
            cleaned.push(' ');
            last_was_space = true;
        }
    }
    if cleaned.ends_with(' ') {
        cleaned.pop();
    }
    cleaned
}

/// Converts detections into the fixed-size numeric vector the classifier
/// consumes: max confidence per known detector class, zero elsewhere.
/// Unknown labels are ignored.
#[must_use]
pub fn object_feature_vector(objects: &[DetectedObject]) -> Vec<f64> {
    let mut vector = vec![0.0; DETECTOR_CLASSES.len()];
    for object in objects {
        if let Some(idx) = DETECTOR_CLASSES.iter().position(|c| *c == object.label) {
            if object.confidence > vector[idx] {
                vector[idx] = object.confidence;
            }
        }
    }
    vector
}

/// Normalizes an OCR quadrilateral (pixel coordinates, corners ordered
/// top-left, top-right, bottom-right, bottom-left) to `[x1, y1, x2, y2]`
/// in `[0, 1]`, keeping the top-left and bottom-right corners.
#[must_use]
pub fn normalize_quad(quad: [[f64; 2]; 4], image_width: u32, image_height: u32) -> [f64; 4] {
    let w = f64::from(image_width.max(1));
    let h = f64::from(image_height.max(1));
    let top_left = quad[0];
    let bottom_right = quad[2];
    [top_left[0] / w, top_left[1] / h, bottom_right[0] / w, bottom_right[1] / h]
}
