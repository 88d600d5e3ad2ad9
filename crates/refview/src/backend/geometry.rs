use std::fmt;
use std::str::FromStr;

use crate::layout::SizeHints;

/// Window geometry in X11 notation: `WxH`, `WxH+X+Y` or `+X+Y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub size: Option<(u32, u32)>,
    pub position: Option<(i32, i32)>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid geometry '{0}': expected WxH, WxH+X+Y or +X+Y")]
pub struct ParseGeometryError(pub String);

impl Geometry {
    /// Requested size as layout hints, if the geometry carries one.
    pub fn size_hints(&self) -> Option<SizeHints> {
        let (w, h) = self.size?;
        Some(SizeHints::new(i32::try_from(w).ok(), i32::try_from(h).ok()))
    }
}

impl FromStr for Geometry {
    type Err = ParseGeometryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let err = || ParseGeometryError(s.to_string());
        if text.is_empty() {
            return Err(err());
        }

        let split = text.find(['+', '-']).unwrap_or(text.len());
        let (dims, offsets) = text.split_at(split);

        let size = if dims.is_empty() {
            None
        } else {
            let (w, h) = dims.split_once(['x', 'X']).ok_or_else(err)?;
            Some((w.parse().map_err(|_| err())?, h.parse().map_err(|_| err())?))
        };

        // Each offset keeps its sign: "+10-20" -> ["+10", "-20"]
        let mut coords = Vec::new();
        let mut rest = offsets;
        while !rest.is_empty() {
            let end = rest[1..].find(['+', '-']).map(|i| i + 1).unwrap_or(rest.len());
            let value: i32 = rest[..end].parse().map_err(|_| err())?;
            coords.push(value);
            rest = &rest[end..];
        }
        let position = match coords.as_slice() {
            [] => None,
            [x, y] => Some((*x, *y)),
            _ => return Err(err()),
        };

        Ok(Geometry { size, position })
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some((w, h)) = self.size {
            write!(f, "{}x{}", w, h)?;
        }
        if let Some((x, y)) = self.position {
            write!(f, "{:+}{:+}", x, y)?;
        }
        Ok(())
    }
}
