// `core` has no float math, so without `std` these come from libm.
pub(super) trait FExt {
    fn ceil(self) -> Self;
    fn floor(self) -> Self;
    fn trunc(self) -> Self;
    fn sqrt(self) -> Self;
    fn round_ties_even(self) -> Self;
}

impl FExt for f64 {
    fn ceil(self) -> Self {
        libm::ceil(self)
    }

    fn floor(self) -> Self {
        libm::floor(self)
    }

    fn trunc(self) -> Self {
        libm::trunc(self)
    }

    fn sqrt(self) -> Self {
        libm::sqrt(self)
    }

    fn round_ties_even(self) -> Self {
        libm::rint(self)
    }
}

impl FExt for f32 {
    fn ceil(self) -> Self {
        libm::ceilf(self)
    }

    fn floor(self) -> Self {
        libm::floorf(self)
    }

    fn trunc(self) -> Self {
        libm::truncf(self)
    }

    fn sqrt(self) -> Self {
        libm::sqrtf(self)
    }

    fn round_ties_even(self) -> Self {
        libm::rintf(self)
    }
}
