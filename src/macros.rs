//! 简化 From trait 实现的宏
//!
//! source 都可以由对应的配置结构体构造，并转换为 `Box<dyn Source<T>>`

/// 为配置类型自动实现 From trait，调用 `Type::new(config)`
///
/// 支持两种模式：
/// 1. `impl_from!(<T: Bound> ConfigType => Type<T>)` - 泛型 source
/// 2. `impl_from!(ConfigType => Type)`
#[macro_export]
macro_rules! impl_from {
    (<$g:ident : $bound:path> $config_type:ty => $target_type:ty) => {
        impl<$g: $bound> From<$config_type> for $target_type {
            fn from(config: $config_type) -> Self {
                <$target_type>::new(config)
            }
        }
    };

    ($config_type:ty => $target_type:ty) => {
        impl From<$config_type> for $target_type {
            fn from(config: $config_type) -> Self {
                <$target_type>::new(config)
            }
        }
    };
}

/// 为 Box<T> 类型自动实现到 Box<dyn Trait> 的转换
///
/// 用法：`impl_box_from!(<T: Bound> Type<T> => dyn Source<T>)`
#[macro_export]
macro_rules! impl_box_from {
    (<$g:ident : $bound:path> $source_type:ty => dyn $trait_name:path) => {
        impl<$g: $bound> From<Box<$source_type>> for Box<dyn $trait_name> {
            fn from(source: Box<$source_type>) -> Self {
                source as Box<dyn $trait_name>
            }
        }
    };

    ($source_type:ty => dyn $trait_name:path) => {
        impl From<Box<$source_type>> for Box<dyn $trait_name> {
            fn from(source: Box<$source_type>) -> Self {
                source as Box<dyn $trait_name>
            }
        }
    };
}
