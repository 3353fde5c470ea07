//! Land-use keyed hydrologic parameter assignment.

use std::collections::BTreeSet;

use super::Grid;
use crate::context::Diagnostics;
use crate::landuse;
use crate::tables::CatchmentTable;

impl Grid {
    /// Copy catchment properties onto every classified cell.
    ///
    /// Cells are matched by the string form of their land-use code. Unmatched
    /// classes keep the default parameters and are reported once each. Returns
    /// the number of cells updated.
    pub fn set_catchment_properties(
        &mut self,
        table: Option<&CatchmentTable>,
        diagnostics: &mut Diagnostics,
    ) -> usize {
        let Some(table) = table else {
            diagnostics.warn("No catchment property table provided; cells keep default parameters");
            return 0;
        };

        let mut updated = 0;
        let mut unmatched = BTreeSet::new();
        for row in 0..self.nrows {
            for col in 0..self.ncols {
                let cell = self.cell_mut(row, col);
                if !landuse::is_classified(cell.landuse) {
                    continue;
                }
                match table.lookup(&cell.landuse.to_string()) {
                    Some(props) => {
                        props.apply(&mut cell.params);
                        updated += 1;
                    }
                    None => {
                        unmatched.insert(cell.landuse);
                    }
                }
            }
        }

        for code in unmatched {
            diagnostics.warn(format!(
                "Land use {} ({}) has no catchment properties; defaults kept",
                code,
                landuse::label(code)
            ));
        }
        updated
    }
}
