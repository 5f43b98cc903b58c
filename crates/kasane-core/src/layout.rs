use crate::types::{CompositeOp, Keycode, LayerId, MatrixPos};
use std::collections::HashMap;
use thiserror::Error;

/// Upper bound on layers per layout; LayerId is a small index, not a handle.
pub const MAX_LAYERS: usize = 32;

/// Fatal configuration errors. Detected when a layout is built or when an
/// engine is constructed over one; never produced while processing events.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("layout declares no layers")]
    Empty,
    #[error("layout declares {0} layers, at most {MAX_LAYERS} are supported")]
    TooManyLayers(usize),
    #[error("duplicate layer name `{0}`")]
    DuplicateLayer(String),
    #[error("layer `{layer}` has {found} rows, expected {expected}")]
    RaggedLayer {
        layer: String,
        found: usize,
        expected: usize,
    },
    #[error("layer `{layer}` row {row} has {found} columns, expected {expected}")]
    RaggedRow {
        layer: String,
        row: usize,
        found: usize,
        expected: usize,
    },
    #[error("cell ({row},{col}) of layer `{layer}` references layer {target}, but only {count} layers exist")]
    LayerOutOfRange {
        layer: String,
        row: usize,
        col: usize,
        target: LayerId,
        count: usize,
    },
    #[error("default-capable layer `{layer}` has a transparent cell at ({row},{col})")]
    TransparentDefault { layer: String, row: usize, col: usize },
    #[error("composite action {id} references layer {target}, but only {count} layers exist")]
    CompositeLayerOutOfRange {
        id: u16,
        target: LayerId,
        count: usize,
    },
}

/// Immutable `[layer][row][col]` keycode table plus the layout's
/// composite-action definitions. Constructed once, never mutated by the
/// runtime engine.
#[derive(Debug, Clone)]
pub struct Layout {
    name: Option<String>,
    rows: u8,
    cols: u8,
    layer_names: Vec<String>,
    grids: Vec<Vec<Vec<Keycode>>>,
    composites: HashMap<u16, CompositeOp>,
}

impl Layout {
    pub fn builder(rows: u8, cols: u8) -> LayoutBuilder {
        LayoutBuilder {
            name: None,
            rows,
            cols,
            layers: Vec::new(),
            composites: HashMap::new(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn rows(&self) -> u8 {
        self.rows
    }

    pub fn cols(&self) -> u8 {
        self.cols
    }

    pub fn layer_count(&self) -> usize {
        self.grids.len()
    }

    pub fn layer_name(&self, layer: LayerId) -> Option<&str> {
        self.layer_names.get(layer as usize).map(String::as_str)
    }

    pub fn layer_id(&self, name: &str) -> Option<LayerId> {
        self.layer_names
            .iter()
            .position(|n| n.eq_ignore_ascii_case(name))
            .map(|i| i as LayerId)
    }

    /// Cell lookup. Both indices are validated at construction time; the
    /// engine guards scanner positions before calling this.
    pub fn cell(&self, layer: LayerId, pos: MatrixPos) -> Keycode {
        self.grids[layer as usize][pos.row as usize][pos.col as usize]
    }

    pub fn in_bounds(&self, pos: MatrixPos) -> bool {
        pos.row < self.rows && pos.col < self.cols
    }

    pub fn composite(&self, id: u16) -> Option<&CompositeOp> {
        self.composites.get(&id)
    }

    /// Re-checks every construction invariant. `LayoutBuilder::finish` has
    /// already run this; engines run it again so hand-assembled tables get
    /// the same treatment.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate(
            self.rows,
            self.cols,
            &self.layer_names,
            &self.grids,
            &self.composites,
        )
    }
}

pub struct LayoutBuilder {
    name: Option<String>,
    rows: u8,
    cols: u8,
    layers: Vec<(String, Vec<Vec<Keycode>>)>,
    composites: HashMap<u16, CompositeOp>,
}

impl LayoutBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Appends a layer; declaration order assigns LayerIds.
    pub fn layer(mut self, name: impl Into<String>, grid: Vec<Vec<Keycode>>) -> Self {
        self.layers.push((name.into(), grid));
        self
    }

    pub fn composite(mut self, id: u16, op: CompositeOp) -> Self {
        self.composites.insert(id, op);
        self
    }

    pub fn finish(self) -> Result<Layout, ConfigError> {
        let layer_names: Vec<String> = self.layers.iter().map(|(n, _)| n.clone()).collect();
        let grids: Vec<Vec<Vec<Keycode>>> = self.layers.into_iter().map(|(_, g)| g).collect();
        validate(self.rows, self.cols, &layer_names, &grids, &self.composites)?;
        Ok(Layout {
            name: self.name,
            rows: self.rows,
            cols: self.cols,
            layer_names,
            grids,
            composites: self.composites,
        })
    }
}

fn validate(
    rows: u8,
    cols: u8,
    layer_names: &[String],
    grids: &[Vec<Vec<Keycode>>],
    composites: &HashMap<u16, CompositeOp>,
) -> Result<(), ConfigError> {
    if grids.is_empty() {
        return Err(ConfigError::Empty);
    }
    if grids.len() > MAX_LAYERS {
        return Err(ConfigError::TooManyLayers(grids.len()));
    }
    for (i, name) in layer_names.iter().enumerate() {
        if layer_names[..i].iter().any(|n| n.eq_ignore_ascii_case(name)) {
            return Err(ConfigError::DuplicateLayer(name.clone()));
        }
    }

    let count = grids.len();
    let mut default_capable = vec![false; count];
    default_capable[0] = true;

    for (li, grid) in grids.iter().enumerate() {
        let layer = &layer_names[li];
        if grid.len() != rows as usize {
            return Err(ConfigError::RaggedLayer {
                layer: layer.clone(),
                found: grid.len(),
                expected: rows as usize,
            });
        }
        for (ri, row) in grid.iter().enumerate() {
            if row.len() != cols as usize {
                return Err(ConfigError::RaggedRow {
                    layer: layer.clone(),
                    row: ri,
                    found: row.len(),
                    expected: cols as usize,
                });
            }
            for (ci, &cell) in row.iter().enumerate() {
                let target = match cell {
                    Keycode::MomentaryLayer(l)
                    | Keycode::DefaultLayer(l)
                    | Keycode::LayerTap { layer: l, .. } => Some(l),
                    _ => None,
                };
                if let Some(l) = target {
                    if l as usize >= count {
                        return Err(ConfigError::LayerOutOfRange {
                            layer: layer.clone(),
                            row: ri,
                            col: ci,
                            target: l,
                            count,
                        });
                    }
                }
                if let Keycode::DefaultLayer(l) = cell {
                    default_capable[l as usize] = true;
                }
            }
        }
    }

    // Any layer the default selection can land on must resolve every
    // position by itself.
    for (li, grid) in grids.iter().enumerate() {
        if !default_capable[li] {
            continue;
        }
        for (ri, row) in grid.iter().enumerate() {
            for (ci, &cell) in row.iter().enumerate() {
                if cell.is_transparent() {
                    return Err(ConfigError::TransparentDefault {
                        layer: layer_names[li].clone(),
                        row: ri,
                        col: ci,
                    });
                }
            }
        }
    }

    for (&id, op) in composites {
        let mut targets: Vec<LayerId> = Vec::new();
        if let CompositeOp::ModeSwitch {
            deactivate,
            activate,
            ..
        } = op
        {
            targets.extend(deactivate.iter().copied());
            targets.extend(activate.iter().copied());
        }
        for l in targets {
            if l as usize >= count {
                return Err(ConfigError::CompositeLayerOutOfRange {
                    id,
                    target: l,
                    count,
                });
            }
        }
    }

    Ok(())
}
