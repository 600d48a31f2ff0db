//! Center loss
//!
//! Pulls every embedding toward a learnable centroid of its class:
//! `sum_i clamp(||x_i - c_{y_i}||^2, 1e-12, 1e12) / batch`.
//! The centroids are module parameters, so the same backward pass that
//! trains the classifier also moves them.

use burn::{
    config::Config,
    module::{Module, Param},
    nn::Initializer,
    tensor::{backend::Backend, Int, Tensor},
};

const MIN_DISTANCE: f64 = 1e-12;
const MAX_DISTANCE: f64 = 1e12;

/// Configuration for [`CenterLoss`]
#[derive(Config, Debug)]
pub struct CenterLossConfig {
    /// Number of classes, one centroid each
    pub num_classes: usize,

    /// Width of the embeddings
    pub embedding_dim: usize,
}

impl CenterLossConfig {
    /// Centroids drawn from a standard normal distribution
    pub fn init<B: Backend>(&self, device: &B::Device) -> CenterLoss<B> {
        let centers = Initializer::Normal {
            mean: 0.0,
            std: 1.0,
        }
        .init([self.num_classes, self.embedding_dim], device);

        CenterLoss { centers }
    }
}

/// Learnable class centroids `[num_classes, embedding_dim]`
#[derive(Module, Debug)]
pub struct CenterLoss<B: Backend> {
    pub centers: Param<Tensor<B, 2>>,
}

impl<B: Backend> CenterLoss<B> {
    /// Mean clamped squared distance between embeddings and their centroids
    ///
    /// # Shapes
    /// - embeddings: `[batch, embedding_dim]`
    /// - labels: `[batch]`
    /// - output: `[1]`
    pub fn forward(&self, embeddings: Tensor<B, 2>, labels: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        let [batch, _] = embeddings.dims();

        let centers = self.centers.val().select(0, labels);
        let distances = (embeddings - centers)
            .powi_scalar(2)
            .sum_dim(1)
            .clamp(MIN_DISTANCE, MAX_DISTANCE);

        distances.sum().div_scalar(batch.max(1) as f64)
    }

    pub fn num_classes(&self) -> usize {
        self.centers.dims()[0]
    }

    pub fn embedding_dim(&self) -> usize {
        self.centers.dims()[1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::Autodiff;
    use burn::tensor::ElementConversion;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;
    type TestAutodiffBackend = Autodiff<NdArray>;

    fn center_loss<B: Backend>(centers: [[f32; 2]; 2], device: &B::Device) -> CenterLoss<B> {
        CenterLoss {
            centers: Param::from_tensor(Tensor::from_floats(centers, device)),
        }
    }

    #[test]
    fn test_init_shape() {
        let device = Default::default();
        let loss = CenterLossConfig::new(5, 12).init::<TestBackend>(&device);
        assert_eq!(loss.num_classes(), 5);
        assert_eq!(loss.embedding_dim(), 12);
    }

    #[test]
    fn test_zero_at_centroids() {
        let device = Default::default();
        let loss = center_loss::<TestBackend>([[0.0, 1.0], [2.0, 3.0]], &device);

        let embeddings = Tensor::<TestBackend, 2>::from_floats([[2.0, 3.0], [0.0, 1.0]], &device);
        let labels = Tensor::<TestBackend, 1, Int>::from_ints([1, 0], &device);

        let value: f64 = loss.forward(embeddings, labels).into_scalar().elem();
        assert!(value.abs() < 1e-9);
    }

    #[test]
    fn test_known_value() {
        let device = Default::default();
        let loss = center_loss::<TestBackend>([[0.0, 0.0], [1.0, 1.0]], &device);

        // Squared distances 1 and 4
        let embeddings = Tensor::<TestBackend, 2>::from_floats([[1.0, 0.0], [1.0, 3.0]], &device);
        let labels = Tensor::<TestBackend, 1, Int>::from_ints([0, 1], &device);

        let value: f64 = loss.forward(embeddings, labels).into_scalar().elem();
        assert!((value - 2.5).abs() < 1e-6);
    }

    #[test]
    fn test_gradient_reaches_centroids() {
        let device = Default::default();
        let loss = center_loss::<TestAutodiffBackend>([[0.0, 0.0], [1.0, 1.0]], &device);

        let embeddings =
            Tensor::<TestAutodiffBackend, 2>::from_floats([[1.0, 0.0], [1.0, 3.0]], &device)
                .require_grad();
        let labels = Tensor::<TestAutodiffBackend, 1, Int>::from_ints([0, 1], &device);

        let grads = loss.forward(embeddings.clone(), labels).backward();

        // d/dc_y = -2 (x - c_y) / batch
        let center_grad: Vec<f32> = loss
            .centers
            .val()
            .grad(&grads)
            .unwrap()
            .into_data()
            .to_vec()
            .unwrap();
        assert_eq!(center_grad, vec![-1.0, 0.0, 0.0, -2.0]);

        let embedding_grad: Vec<f32> = embeddings.grad(&grads).unwrap().into_data().to_vec().unwrap();
        assert_eq!(embedding_grad, vec![1.0, 0.0, 0.0, 2.0]);
    }

    #[test]
    fn test_shared_class_accumulates_gradient() {
        let device = Default::default();
        let loss = center_loss::<TestAutodiffBackend>([[0.0, 0.0], [5.0, 5.0]], &device);

        let embeddings =
            Tensor::<TestAutodiffBackend, 2>::from_floats([[1.0, 0.0], [0.0, 1.0]], &device);
        let labels = Tensor::<TestAutodiffBackend, 1, Int>::from_ints([0, 0], &device);

        let grads = loss.forward(embeddings, labels).backward();
        let center_grad: Vec<f32> = loss
            .centers
            .val()
            .grad(&grads)
            .unwrap()
            .into_data()
            .to_vec()
            .unwrap();

        // Both samples pull centroid 0; centroid 1 is untouched
        assert_eq!(center_grad, vec![-1.0, -1.0, 0.0, 0.0]);
    }
}
