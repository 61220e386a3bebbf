pub mod regressor_onnx;
