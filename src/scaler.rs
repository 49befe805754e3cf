//! Zero-mean / unit-variance scaling fitted once over the whole population

use linfa::traits::{Fit, Transformer};
use linfa::Dataset;
use linfa_preprocessing::linear_scaling::LinearScaler;
use ndarray::{Array1, Array2, ArrayView1, Axis};

/// Per-feature standardization parameters
///
/// Fitted once on the full feature matrix and then passed around, so that
/// every later transform (including scoring new entities) uses the same
/// reference population. Constant features are centred but left unscaled.
#[derive(Debug)]
pub struct StandardScaler {
    inner: LinearScaler<f64>,
}

impl StandardScaler {
    /// Fit on the rows of `data`; fails on an empty matrix
    pub fn fit(data: &Array2<f64>) -> crate::Result<Self> {
        let dataset = Dataset::new(data.clone(), Array1::<usize>::zeros(data.nrows()));
        let inner = LinearScaler::standard()
            .fit(&dataset)
            .map_err(|e| anyhow::anyhow!("Scaler fit failed: {}", e))?;

        Ok(Self { inner })
    }

    pub fn n_features(&self) -> usize {
        self.inner.offsets().len()
    }

    /// Standardize every row of `data`
    pub fn transform(&self, data: &Array2<f64>) -> crate::Result<Array2<f64>> {
        if data.ncols() != self.n_features() {
            anyhow::bail!(
                "expected {} features, got {}",
                self.n_features(),
                data.ncols()
            );
        }
        Ok(self.inner.transform(data.to_owned()))
    }

    /// Standardize a single raw feature vector
    pub fn transform_row(&self, row: ArrayView1<f64>) -> crate::Result<Array1<f64>> {
        let matrix = row.to_owned().insert_axis(Axis(0));
        let scaled = self.transform(&matrix)?;
        Ok(scaled.row(0).to_owned())
    }
}
