///Represents a vector in 2D space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector2 {
    ///Value along the x-axis.
    /// Positive direction is to the right.
    pub x: f32,
    ///Value along the y-axis.
    /// Positive direction is down, matching map coordinates.
    pub y: f32,
}

impl Vector2 {
    pub const ZERO: Vector2 = Vector2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Vector2 { x, y }
    }

    ///Returns the magnitude of the vector.
    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    ///Returns the normalized vector.
    pub fn normalize(&self) -> Vector2 {
        let mag = self.magnitude();
        if mag == 0.0 {
            Vector2::ZERO
        } else {
            Vector2 {
                x: self.x / mag,
                y: self.y / mag,
            }
        }
    }

    ///Returns the scaled vector.
    pub fn scale(&self, scalar: f32) -> Vector2 {
        Vector2 {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }

    ///Returns the sum of two vectors.
    pub fn add(&self, other: &Vector2) -> Vector2 {
        Vector2 {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }

    ///Returns `self - other`.
    pub fn sub(&self, other: &Vector2) -> Vector2 {
        Vector2 {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }

    ///Largest absolute component.
    pub fn max_component(&self) -> f32 {
        self.x.abs().max(self.y.abs())
    }

    ///Returns the vector shortened to `max` if it is longer, keeping its direction.
    pub fn clamp_magnitude(&self, max: f32) -> Vector2 {
        if self.magnitude() > max {
            self.normalize().scale(max)
        } else {
            *self
        }
    }

    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_vector_magnitude() {
        let v = Vector2::new(3.0, 4.0);
        assert_approx_eq!(v.magnitude(), 5.0);
    }

    #[test]
    fn test_vector_normalize() {
        let n = Vector2::new(3.0, 4.0).normalize();
        assert_approx_eq!(n.x, 0.6);
        assert_approx_eq!(n.y, 0.8);
        assert_eq!(Vector2::ZERO.normalize(), Vector2::ZERO);
    }

    #[test]
    fn test_vector_sub_and_max_component() {
        let d = Vector2::new(10.0, -2.0).sub(&Vector2::new(4.0, 5.0));
        assert_eq!(d, Vector2::new(6.0, -7.0));
        assert_approx_eq!(d.max_component(), 7.0);
    }

    #[test]
    fn test_clamp_magnitude_keeps_direction() {
        let clamped = Vector2::new(600.0, 0.0).clamp_magnitude(300.0);
        assert_approx_eq!(clamped.x, 300.0);
        assert_approx_eq!(clamped.y, 0.0);

        let diagonal = Vector2::new(300.0, 400.0).clamp_magnitude(100.0);
        assert_approx_eq!(diagonal.magnitude(), 100.0, 1e-3);
        assert_approx_eq!(diagonal.x / diagonal.y, 0.75, 1e-4);

        let short = Vector2::new(1.0, 1.0);
        assert_eq!(short.clamp_magnitude(300.0), short);
    }
}
