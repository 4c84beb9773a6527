pub mod ds_ops;
